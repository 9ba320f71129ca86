use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_secs(1);

pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
}

impl FrameTiming {
    pub fn new(now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
        }
    }

    /// Counts one frame. Once a full second has passed, returns the number of
    /// frames in that window and starts a new one.
    pub fn update(&mut self, now: Instant) -> Option<u32> {
        let dt_duration = if let Some(last) = self.last_frame_time {
            now.saturating_duration_since(last)
        } else {
            Duration::from_millis(16)
        };
        self.last_frame_time = Some(now);
        // Long stalls (dialogs, window drags) must not fling the camera.
        self.frame_dt = dt_duration.as_secs_f32().clamp(0.0, 0.1);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed >= FPS_WINDOW {
            let fps = self.frame_count;
            self.frame_count = 0;
            self.last_fps_time = now;
            return Some(fps);
        }
        None
    }
}
