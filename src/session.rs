//! One live viewer: scene, loaders, camera and renderer, driven from the UI thread.

use crate::app::timing::FrameTiming;
use crate::assets::environment::{EnvironmentLoader, LightingPreset};
use crate::assets::fetch::{Dispatch, Fetch};
use crate::assets::{AssetError, ModelLoader, ModelSource};
use crate::config::ViewerConfig;
use crate::render::{
    compute_framing, CameraMode, CameraPreset, FrameReport, OrbitControls, RenderContext,
    ScreenshotError,
};
use crate::scene::material::{parse_hex_color, ColorParseError, MaterialSelection, MetalPreset, Rgb};
use crate::scene::{ModelManager, ModelStats, SceneGraph};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading { label: String },
}

/// Everything the overlay displays.
#[derive(Debug, Clone)]
pub struct ViewerState {
    pub material: MaterialSelection,
    pub custom_color: Rgb,
    pub camera: CameraMode,
    /// Last preset the user picked.
    pub lighting: LightingPreset,
    /// Preset whose HDRI is currently installed.
    pub environment: Option<LightingPreset>,
    pub auto_rotate: bool,
    pub fullscreen: bool,
    pub show_stats: bool,
    pub fps: u32,
    pub stats: ModelStats,
    pub load_status: LoadStatus,
    pub status: String,
}

/// Something the user must acknowledge; shown as a blocking dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

pub struct ViewerSession {
    config: ViewerConfig,
    state: ViewerState,
    scene: SceneGraph,
    models: ModelManager,
    environments: EnvironmentLoader,
    loader: ModelLoader,
    controls: OrbitControls,
    renderer: RenderContext,
    timing: FrameTiming,
    notifications: Vec<Notification>,
}

impl ViewerSession {
    pub fn new(config: ViewerConfig, fetcher: Arc<dyn Fetch>, dispatch: Dispatch, now: Instant) -> Self {
        let scene = SceneGraph::with_default_lights();
        let framing = compute_framing(CameraPreset::Front, &scene.active_bounds());
        let controls = OrbitControls::new(framing, config.auto_rotate_speed);
        let renderer = RenderContext::new(&config);
        let models = ModelManager::new(config.target_model_size, config.material_policy);
        let state = ViewerState {
            material: MaterialSelection::default(),
            custom_color: Rgb::new(0xFF, 0xD7, 0x00),
            camera: CameraMode::Preset(CameraPreset::Front),
            lighting: config.initial_lighting,
            environment: None,
            auto_rotate: false,
            fullscreen: false,
            show_stats: false,
            fps: 0,
            stats: ModelStats::default(),
            load_status: LoadStatus::Idle,
            status: String::new(),
        };

        let mut session = Self {
            environments: EnvironmentLoader::new(Arc::clone(&fetcher), dispatch),
            loader: ModelLoader::new(fetcher, dispatch),
            config,
            state,
            scene,
            models,
            controls,
            renderer,
            timing: FrameTiming::new(now),
            notifications: Vec::new(),
        };
        session.set_lighting(session.state.lighting);
        session
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    #[cfg(test)]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn environment_loading(&self) -> bool {
        self.environments.in_flight().is_some()
    }

    /// Dialogs queued since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn set_lighting(&mut self, preset: LightingPreset) {
        self.state.lighting = preset;
        self.environments.request(preset);
    }

    pub fn apply_material(&mut self, selection: MaterialSelection) {
        self.state.material = selection;
        if let MaterialSelection::Custom(color) = selection {
            self.state.custom_color = color;
        }
        let report = self.models.apply_material(&mut self.scene, selection);
        log::debug!("Material {:?}: {:?}", selection, report);
    }

    pub fn apply_metal(&mut self, preset: MetalPreset) {
        self.apply_material(MaterialSelection::Metal(preset));
    }

    /// Applies `#RRGGBB` as a custom colour; anything else leaves the previous colour.
    pub fn set_custom_color(&mut self, text: &str) -> Result<Rgb, ColorParseError> {
        match parse_hex_color(text) {
            Ok(color) => {
                self.apply_material(MaterialSelection::Custom(color));
                Ok(color)
            }
            Err(err) => {
                log::warn!("Ignoring custom colour: {}", err);
                self.state.status = err.to_string();
                Err(err)
            }
        }
    }

    pub fn select_camera(&mut self, preset: CameraPreset) {
        let framing = compute_framing(preset, &self.scene.active_bounds());
        self.controls.set_framing(&framing);
        self.state.camera = CameraMode::Preset(preset);
    }

    /// Front framing without touching the recorded camera mode or its zoom limit.
    pub fn zoom_to_fit(&mut self) {
        let bounds = self.scene.active_bounds();
        let min_distance = match self.state.camera {
            CameraMode::Preset(preset) => compute_framing(preset, &bounds).min_distance,
            CameraMode::Free => self.controls.min_distance,
        };
        let framing = compute_framing(CameraPreset::Front, &bounds);
        self.controls.set_framing(&framing);
        self.controls.min_distance = min_distance;
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.controls.rotate(dx, dy);
        self.state.camera = CameraMode::Free;
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.controls.pan(dx, dy);
        self.state.camera = CameraMode::Free;
    }

    pub fn zoom(&mut self, delta: f32) {
        self.controls.zoom(delta);
        self.state.camera = CameraMode::Free;
    }

    pub fn toggle_auto_rotate(&mut self) {
        self.state.auto_rotate = !self.state.auto_rotate;
        self.controls.auto_rotate = self.state.auto_rotate;
    }

    pub fn toggle_stats(&mut self) {
        self.state.show_stats = !self.state.show_stats;
    }

    /// Flips the flag; the window layer applies it.
    pub fn toggle_fullscreen(&mut self) -> bool {
        self.state.fullscreen = !self.state.fullscreen;
        self.state.fullscreen
    }

    pub fn load_model(&mut self, source: ModelSource) -> Result<(), AssetError> {
        let label = source.label();
        match self.loader.request(source) {
            Ok(_) => {
                self.state.status = format!("Loading {}…", label);
                self.state.load_status = LoadStatus::Loading { label };
                Ok(())
            }
            Err(err) => {
                log::warn!("Rejected model source {}: {}", label, err);
                self.state.status = err.to_string();
                Err(err)
            }
        }
    }

    pub fn reset_model(&mut self) {
        let band = self.state.material.descriptor();
        self.state.stats = self.models.reset(&mut self.scene, band);
        self.state.load_status = LoadStatus::Idle;
        self.state.status = "Showing the default ring".to_string();
    }

    /// Output size in window pixels; the framebuffer is scaled by `render_scale`.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        let scale = self.config.render_scale.clamp(0.1, 2.0);
        let width = (width * scale).round().max(1.0) as usize;
        let height = (height * scale).round().max(1.0) as usize;
        if self.renderer.size() != (width, height) {
            self.renderer.set_size(width, height);
        }
    }

    /// Tone-mapped RGBA8 pixels and their size.
    pub fn frame(&self) -> (&[u8], (usize, usize)) {
        (self.renderer.pixels(), self.renderer.size())
    }

    pub fn tick(&mut self, now: Instant) -> FrameReport {
        self.apply_environment_outcomes();
        self.apply_model_outcomes();

        let fps = self.timing.update(now);
        self.controls.update(self.timing.frame_dt);
        if let Some(fps) = fps {
            self.state.fps = fps;
        }

        let compiled = self.scene.compile_materials();
        if compiled > 0 {
            log::debug!("Recompiled {} materials", compiled);
        }
        let camera = self.controls.camera();
        self.renderer.render(&self.scene, &camera)
    }

    pub fn capture_screenshot(&mut self) -> Result<PathBuf, ScreenshotError> {
        let camera = self.controls.camera();
        let result = self.renderer.capture_screenshot(
            &self.scene,
            &camera,
            &self.config.screenshot_dir,
            self.config.screenshot_scale,
        );
        match &result {
            Ok(path) => self.state.status = format!("Saved {}", path.display()),
            Err(err) => {
                log::error!("Screenshot failed: {}", err);
                self.state.status = format!("Screenshot failed: {}", err);
            }
        }
        result
    }

    fn apply_environment_outcomes(&mut self) {
        let poll = self.environments.poll();
        let finished = poll.any_finished();
        for outcome in poll.outcomes {
            match outcome.result {
                Ok(environment) => {
                    let (width, height) = environment.size();
                    self.scene.environment = Some(environment);
                    let bound = self.models.bind_environment(&mut self.scene);
                    self.state.environment = Some(outcome.preset);
                    log::info!(
                        "Installed {} environment ({}x{}), {} materials rebound",
                        outcome.preset.label(),
                        width,
                        height,
                        bound
                    );
                }
                Err(err) => {
                    log::warn!(
                        "{} environment unavailable, continuing without it: {}",
                        outcome.preset.label(),
                        err
                    );
                }
            }
        }
        // Superseded loads still bootstrap the ring.
        if finished && !self.models.has_model(&self.scene) {
            let band = self.state.material.descriptor();
            self.state.stats = self.models.create_default_model(&mut self.scene, band);
            // The startup framing was computed before any model existed.
            if let CameraMode::Preset(preset) = self.state.camera {
                self.select_camera(preset);
            }
        }
    }

    fn apply_model_outcomes(&mut self) {
        for outcome in self.loader.poll() {
            match outcome.result {
                Ok(model) => {
                    self.state.stats = self.models.attach_external(&mut self.scene, model);
                    self.state.load_status = LoadStatus::Idle;
                    self.state.status = format!("Loaded {}", outcome.label);
                    log::info!("Loaded {}: {:?}", outcome.label, self.state.stats);
                    self.select_camera(CameraPreset::Front);
                }
                Err(err) if outcome.local => {
                    log::warn!("Failed to load {}: {}", outcome.label, err);
                    self.state.load_status = LoadStatus::Idle;
                    self.state.status = format!("Could not load {}", outcome.label);
                    self.notifications.push(Notification {
                        title: "Could not load model".to_string(),
                        message: format!("{}\n\n{}", outcome.label, err),
                    });
                }
                Err(err) => {
                    // Remote failures leave the loading indicator up until the next load or reset.
                    log::warn!("Failed to load {}: {}", outcome.label, err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::environment::test_support::tiny_hdr;
    use crate::assets::fetch::test_support::StubFetcher;
    use crate::assets::test_support::two_box_glb;
    use std::time::Duration;

    const MODEL_URL: &str = "https://models.example.com/two_box.glb";

    fn hdr() -> Vec<u8> {
        tiny_hdr(4, 2, [128, 128, 128, 129])
    }

    fn session_with(fetcher: StubFetcher) -> (ViewerSession, Arc<StubFetcher>, Instant) {
        let fetcher = Arc::new(fetcher);
        let now = Instant::now();
        let session = ViewerSession::new(
            ViewerConfig::default(),
            Arc::clone(&fetcher) as Arc<dyn Fetch>,
            Dispatch::Inline,
            now,
        );
        (session, fetcher, now)
    }

    fn ready_session() -> (ViewerSession, Arc<StubFetcher>, Instant) {
        let fetcher = StubFetcher::default()
            .with(LightingPreset::Studio.url(), hdr())
            .with(MODEL_URL, two_box_glb());
        let (mut session, fetcher, now) = session_with(fetcher);
        session.tick(now);
        (session, fetcher, now)
    }

    fn ring_id(session: &ViewerSession) -> crate::scene::ModelId {
        session.scene().active_model().unwrap().id()
    }

    #[test]
    fn environment_success_creates_ring_and_binds_materials() {
        let (session, fetcher, _) = ready_session();
        let model = session.scene().active_model().unwrap();
        assert!(model.is_procedural());
        assert!(model.materials.iter().all(|m| m.environment().is_some()));
        assert!(model.materials.iter().all(|m| m.compiled().has_environment));
        assert_eq!(session.state().environment, Some(LightingPreset::Studio));
        assert_eq!(session.state().stats, model.stats());
        assert_eq!(
            fetcher.requests.lock().unwrap().as_slice(),
            &[LightingPreset::Studio.url().to_string()]
        );
    }

    #[test]
    fn environment_failure_still_creates_ring() {
        let (mut session, _, now) = session_with(StubFetcher::default());
        assert!(session.scene().active_model().is_none());
        session.tick(now);
        assert!(session.scene().active_model().unwrap().is_procedural());
        assert!(session.scene().environment.is_none());
        assert_eq!(session.state().environment, None);
    }

    #[test]
    fn stale_environment_is_never_installed() {
        let (mut session, _, now) =
            session_with(StubFetcher::default().with(LightingPreset::Studio.url(), hdr()));
        // Studio's success is already queued; Sunset supersedes it and fails.
        session.set_lighting(LightingPreset::Sunset);
        session.tick(now);
        assert!(session.scene().environment.is_none());
        assert_eq!(session.state().lighting, LightingPreset::Sunset);
        assert!(session.scene().active_model().is_some());
    }

    #[test]
    fn url_load_replaces_model_and_frames_front() {
        let (mut session, _, now) = ready_session();
        session.orbit(30.0, 0.0);
        session.load_model(ModelSource::Url(MODEL_URL.to_string())).unwrap();
        assert!(matches!(session.state().load_status, LoadStatus::Loading { .. }));
        session.tick(now + Duration::from_millis(16));

        let model = session.scene().active_model().unwrap();
        assert!(!model.is_procedural());
        let bounds = model.bounding_box();
        assert!(bounds.center().length() < 1e-4);
        assert!((bounds.max_extent() - 2.0).abs() < 1e-4);
        assert_eq!(session.state().load_status, LoadStatus::Idle);
        assert_eq!(session.state().camera, CameraMode::Preset(CameraPreset::Front));
        assert_eq!(session.state().stats, model.stats());
    }

    #[test]
    fn local_failure_notifies_and_keeps_previous_model() {
        let (mut session, _, now) = ready_session();
        let ring = ring_id(&session);
        session
            .load_model(ModelSource::Bytes {
                name: "broken.glb".to_string(),
                bytes: Arc::from(&b"not a model"[..]),
            })
            .unwrap();
        session.tick(now);

        assert_eq!(ring_id(&session), ring);
        assert_eq!(session.state().load_status, LoadStatus::Idle);
        let notes = session.take_notifications();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("broken.glb"));
        assert!(session.take_notifications().is_empty());
    }

    #[test]
    fn url_failure_stays_loading_without_dialog() {
        let (mut session, _, now) = ready_session();
        let ring = ring_id(&session);
        session
            .load_model(ModelSource::Url("https://models.example.com/missing.glb".to_string()))
            .unwrap();
        session.tick(now);

        assert_eq!(ring_id(&session), ring);
        assert!(matches!(session.state().load_status, LoadStatus::Loading { .. }));
        assert!(session.take_notifications().is_empty());

        session.reset_model();
        assert_eq!(session.state().load_status, LoadStatus::Idle);
    }

    #[test]
    fn short_links_are_rejected_without_fetching() {
        let (mut session, fetcher, _) = ready_session();
        let err = session
            .load_model(ModelSource::Url("https://skfb.ly/abc123".to_string()))
            .unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedShortLink { .. }));
        assert_eq!(session.state().load_status, LoadStatus::Idle);
        assert_eq!(fetcher.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn reset_restores_the_original_ring() {
        let (mut session, _, now) = ready_session();
        let ring = ring_id(&session);
        session.load_model(ModelSource::Url(MODEL_URL.to_string())).unwrap();
        session.tick(now);
        assert_ne!(ring_id(&session), ring);

        session.reset_model();
        assert_eq!(ring_id(&session), ring);
        assert_eq!(
            session.state().stats,
            session.scene().active_model().unwrap().stats()
        );
    }

    #[test]
    fn invalid_hex_keeps_previous_custom_color() {
        let (mut session, _, _) = ready_session();
        let color = session.set_custom_color("#1A2B3C").unwrap();
        assert_eq!(session.state().material, MaterialSelection::Custom(color));

        assert!(session.set_custom_color("1A2B3C").is_err());
        assert!(session.set_custom_color("#1A2B3").is_err());
        assert_eq!(session.state().custom_color, Rgb::new(0x1A, 0x2B, 0x3C));
        assert_eq!(session.state().material, MaterialSelection::Custom(color));
    }

    #[test]
    fn camera_modes_follow_user_input() {
        let (mut session, _, _) = ready_session();
        session.select_camera(CameraPreset::Detail);
        assert_eq!(session.state().camera, CameraMode::Preset(CameraPreset::Detail));
        session.zoom_to_fit();
        assert_eq!(session.state().camera, CameraMode::Preset(CameraPreset::Detail));
        session.zoom(50.0);
        assert_eq!(session.state().camera, CameraMode::Free);
        session.select_camera(CameraPreset::Top);
        let first = session.controls.position();
        session.select_camera(CameraPreset::Top);
        assert!((session.controls.position() - first).length() < 1e-5);
    }

    #[test]
    fn fps_is_published_after_a_second() {
        let (mut session, _, start) = ready_session();
        session.set_viewport(8.0, 8.0);
        assert_eq!(session.state().fps, 0);
        for frame in 1..=20u64 {
            session.tick(start + Duration::from_millis(frame * 50));
        }
        // The warm-up tick from ready_session counts too.
        assert_eq!(session.state().fps, 21);
        let (pixels, (w, h)) = session.frame();
        assert_eq!(pixels.len(), w * h * 4);
    }

    #[test]
    fn toggles_flip_state() {
        let (mut session, _, _) = ready_session();
        session.toggle_auto_rotate();
        assert!(session.state().auto_rotate);
        session.toggle_stats();
        assert!(session.state().show_stats);
        assert!(session.toggle_fullscreen());
        assert!(!session.toggle_fullscreen());
    }

    /// Serves Studio immediately; every other URL blocks until the gate sender is dropped.
    struct GatedFetcher {
        studio: Vec<u8>,
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Fetch for GatedFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, crate::assets::fetch::FetchError> {
            if url == LightingPreset::Studio.url() {
                return Ok(self.studio.clone());
            }
            if let Ok(gate) = self.gate.lock() {
                let _ = gate.recv();
            }
            Err(crate::assets::fetch::FetchError::Request {
                url: url.to_string(),
                message: "gate closed".to_string(),
            })
        }
    }

    #[test]
    fn superseded_environment_still_builds_the_ring() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let fetcher = Arc::new(GatedFetcher {
            studio: hdr(),
            gate: std::sync::Mutex::new(gate),
        });
        let now = Instant::now();
        let mut session =
            ViewerSession::new(ViewerConfig::default(), fetcher, Dispatch::Background, now);
        // Studio is now stale whenever it lands; Sunset never finishes.
        session.set_lighting(LightingPreset::Sunset);

        for frame in 1..=400u64 {
            session.tick(now + Duration::from_millis(frame * 5));
            if session.scene().active_model().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(session.scene().active_model().unwrap().is_procedural());
        assert!(session.scene().environment.is_none());
        assert_eq!(session.state().environment, None);
        assert!(session.environment_loading());
        drop(release);
    }

    #[test]
    fn startup_camera_frames_the_ring() {
        let (session, _, _) = ready_session();
        let bounds = session.scene().active_bounds();
        let front = compute_framing(CameraPreset::Front, &bounds);
        assert_eq!(session.state().camera, CameraMode::Preset(CameraPreset::Front));
        assert!((session.controls.position() - front.position).length() < 1e-4);
        assert!((session.controls.target - front.target).length() < 1e-4);
    }

    #[test]
    fn zoom_to_fit_keeps_the_preset_zoom_limit() {
        let (mut session, _, _) = ready_session();
        let bounds = session.scene().active_bounds();
        session.select_camera(CameraPreset::Detail);
        session.zoom_to_fit();

        let detail = compute_framing(CameraPreset::Detail, &bounds);
        let front = compute_framing(CameraPreset::Front, &bounds);
        assert_eq!(session.controls.min_distance, detail.min_distance);
        assert!((session.controls.position() - front.position).length() < 1e-4);
    }
}
