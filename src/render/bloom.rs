use super::raster::Framebuffer;
use super::RenderError;
use crate::config::BloomSettings;
use glam::Vec3;

/// Bright-pass, half-resolution blur and additive composite over the HDR buffer.
pub struct BloomPipeline {
    threshold: f32,
    strength: f32,
    radius: usize,
    bright: Vec<Vec3>,
    scratch: Vec<Vec3>,
}

impl BloomPipeline {
    pub fn new(settings: &BloomSettings) -> Result<Self, RenderError> {
        if !settings.enabled {
            return Err(RenderError::PostProcessingDisabled);
        }
        if !settings.threshold.is_finite() || settings.threshold < 0.0 {
            return Err(RenderError::InvalidBloom(format!(
                "threshold {} must be a non-negative number",
                settings.threshold
            )));
        }
        if !settings.strength.is_finite() || settings.strength < 0.0 {
            return Err(RenderError::InvalidBloom(format!(
                "strength {} must be a non-negative number",
                settings.strength
            )));
        }
        if settings.radius == 0 || settings.radius > 32 {
            return Err(RenderError::InvalidBloom(format!(
                "radius {} must be within 1..=32",
                settings.radius
            )));
        }
        Ok(Self {
            threshold: settings.threshold,
            strength: settings.strength,
            radius: settings.radius as usize,
            bright: Vec::new(),
            scratch: Vec::new(),
        })
    }

    pub fn apply(&mut self, fb: &mut Framebuffer) {
        let half_w = fb.width.div_ceil(2);
        let half_h = fb.height.div_ceil(2);
        if half_w == 0 || half_h == 0 {
            return;
        }

        self.bright.clear();
        self.bright.resize(half_w * half_h, Vec3::ZERO);
        for y in 0..fb.height {
            for x in 0..fb.width {
                let color = fb.color[y * fb.width + x];
                let luminance = color.dot(Vec3::new(0.2126, 0.7152, 0.0722));
                // Keep only the energy above the threshold; each full-res texel
                // contributes a quarter of its 2x2 half-res cell.
                if luminance > self.threshold {
                    let excess = (luminance - self.threshold) / luminance.max(1e-4);
                    self.bright[(y / 2) * half_w + x / 2] += color * excess * 0.25;
                }
            }
        }

        self.scratch.clear();
        self.scratch.resize(self.bright.len(), Vec3::ZERO);
        // Two 1D passes equal one square box kernel.
        blur_pass(&self.bright, &mut self.scratch, half_w, half_h, self.radius, true);
        blur_pass(&self.scratch, &mut self.bright, half_w, half_h, self.radius, false);

        // Nearest upsample; the blur already hides the blockiness.
        for y in 0..fb.height {
            for x in 0..fb.width {
                fb.color[y * fb.width + x] += self.bright[(y / 2) * half_w + x / 2] * self.strength;
            }
        }
    }
}

/// Box blur along one axis with clamped edges.
fn blur_pass(src: &[Vec3], dst: &mut [Vec3], width: usize, height: usize, radius: usize, horizontal: bool) {
    let weight = 1.0 / (2 * radius + 1) as f32;
    for y in 0..height {
        for x in 0..width {
            let mut sum = Vec3::ZERO;
            for offset in 0..=2 * radius {
                let (sx, sy) = if horizontal {
                    ((x + offset).saturating_sub(radius).min(width - 1), y)
                } else {
                    (x, (y + offset).saturating_sub(radius).min(height - 1))
                };
                sum += src[sy * width + sx];
            }
            dst[y * width + x] = sum * weight;
        }
    }
}
