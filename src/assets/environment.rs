use super::fetch::{CompletionQueue, Dispatch, Fetch, FetchError, Generation};
use glam::Vec3;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Blurred levels kept below the full-resolution panorama.
const MAX_LEVELS: usize = 6;
const MIN_LEVEL_WIDTH: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LightingPreset {
    Studio,
    Sunset,
    Warehouse,
    Forest,
}

impl LightingPreset {
    pub const ALL: [LightingPreset; 4] = [
        LightingPreset::Studio,
        LightingPreset::Sunset,
        LightingPreset::Warehouse,
        LightingPreset::Forest,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LightingPreset::Studio => "Studio",
            LightingPreset::Sunset => "Sunset",
            LightingPreset::Warehouse => "Warehouse",
            LightingPreset::Forest => "Forest",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            LightingPreset::Studio => {
                "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/studio_small_09_1k.hdr"
            }
            LightingPreset::Sunset => {
                "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/venice_sunset_1k.hdr"
            }
            LightingPreset::Warehouse => {
                "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/empty_warehouse_01_1k.hdr"
            }
            LightingPreset::Forest => {
                "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/forest_slope_1k.hdr"
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to decode HDRI: {0}")]
    Decode(#[from] image::ImageError),
    #[error("HDRI has no pixels")]
    Empty,
}

struct Level {
    width: u32,
    height: u32,
    texels: Vec<Vec3>,
}

impl Level {
    fn texel(&self, x: u32, y: u32) -> Vec3 {
        let x = x % self.width;
        let y = y.min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }

    fn sample(&self, u: f32, v: f32) -> Vec3 {
        let fx = u * self.width as f32 - 0.5;
        let fy = (v * self.height as f32 - 0.5).max(0.0);
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        // Longitude wraps, latitude clamps.
        let x0 = x0.rem_euclid(self.width as f32) as u32;
        let y0 = y0 as u32;
        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), tx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }

    /// 2x box downsample followed by a small horizontal wrap blur.
    fn downsample(&self) -> Level {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut texels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let sum = self.texel(x * 2, y * 2)
                    + self.texel(x * 2 + 1, y * 2)
                    + self.texel(x * 2, y * 2 + 1)
                    + self.texel(x * 2 + 1, y * 2 + 1);
                texels.push(sum * 0.25);
            }
        }
        let mut blurred = Vec::with_capacity(texels.len());
        for y in 0..height {
            let row = &texels[(y * width) as usize..((y + 1) * width) as usize];
            for x in 0..width {
                let left = row[((x + width - 1) % width) as usize];
                let right = row[((x + 1) % width) as usize];
                blurred.push((left + row[x as usize] * 2.0 + right) * 0.25);
            }
        }
        Level {
            width,
            height,
            texels: blurred,
        }
    }
}

/// Equirectangular HDR panorama with a pre-blurred chain for rough reflections.
pub struct EnvironmentMap {
    levels: Vec<Level>,
}

impl fmt::Debug for EnvironmentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.size();
        f.debug_struct("EnvironmentMap")
            .field("width", &width)
            .field("height", &height)
            .field("levels", &self.levels.len())
            .finish()
    }
}

impl EnvironmentMap {
    pub fn from_hdr_bytes(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Hdr)?;
        Self::from_rgb32f(&image.into_rgb32f())
    }

    pub fn from_rgb32f(image: &image::Rgb32FImage) -> Result<Self, EnvironmentError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EnvironmentError::Empty);
        }
        let texels = image
            .pixels()
            .map(|pixel| Vec3::new(pixel[0], pixel[1], pixel[2]).max(Vec3::ZERO))
            .collect();
        let mut levels = vec![Level {
            width,
            height,
            texels,
        }];
        while levels.len() < MAX_LEVELS {
            let Some(last) = levels.last() else { break };
            if last.width <= MIN_LEVEL_WIDTH {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// Uniform-radiance panorama, mostly useful as a neutral fallback.
    #[cfg(test)]
    pub fn uniform(radiance: Vec3) -> Self {
        Self {
            levels: vec![Level {
                width: 1,
                height: 1,
                texels: vec![radiance],
            }],
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.levels
            .first()
            .map_or((0, 0), |level| (level.width, level.height))
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Radiance arriving from `direction`; `level` blends between blur levels.
    pub fn sample(&self, direction: Vec3, level: f32) -> Vec3 {
        let Some(direction) = direction.try_normalize() else {
            return Vec3::ZERO;
        };
        // Equirectangular lookup: u from azimuth, v from polar angle measured off +Y.
        let u = direction.z.atan2(direction.x) / (2.0 * PI) + 0.5;
        let v = direction.y.clamp(-1.0, 1.0).acos() / PI;
        let max_level = (self.levels.len() - 1) as f32;
        let level = level.clamp(0.0, max_level);
        let lower = level.floor() as usize;
        let upper = (lower + 1).min(self.levels.len() - 1);
        let t = level - lower as f32;
        let a = self.levels[lower].sample(u, v);
        if upper == lower || t <= f32::EPSILON {
            return a;
        }
        a.lerp(self.levels[upper].sample(u, v), t)
    }
}

pub struct EnvironmentOutcome {
    pub preset: LightingPreset,
    pub result: Result<Arc<EnvironmentMap>, EnvironmentError>,
}

/// One poll's worth of finished loads.
pub struct EnvironmentPoll {
    pub outcomes: Vec<EnvironmentOutcome>,
    /// Loads that finished after a newer preset was requested; their maps are dropped.
    pub superseded: usize,
}

impl EnvironmentPoll {
    /// Whether any request, current or superseded, finished.
    pub fn any_finished(&self) -> bool {
        !self.outcomes.is_empty() || self.superseded > 0
    }
}

/// Fetches and decodes HDRIs off the UI thread; one request per preset switch.
pub struct EnvironmentLoader {
    fetcher: Arc<dyn Fetch>,
    dispatch: Dispatch,
    queue: CompletionQueue<EnvironmentOutcome>,
    in_flight: Option<LightingPreset>,
}

impl EnvironmentLoader {
    pub fn new(fetcher: Arc<dyn Fetch>, dispatch: Dispatch) -> Self {
        Self {
            fetcher,
            dispatch,
            queue: CompletionQueue::new("environment"),
            in_flight: None,
        }
    }

    pub fn in_flight(&self) -> Option<LightingPreset> {
        self.in_flight
    }

    pub fn request(&mut self, preset: LightingPreset) -> Generation {
        let (generation, reply) = self.queue.begin();
        self.in_flight = Some(preset);
        log::info!(
            "Loading {} environment (request {})",
            preset.label(),
            reply.generation()
        );
        let fetcher = Arc::clone(&self.fetcher);
        self.dispatch.run("hdri-fetch", move || {
            let result = fetcher
                .fetch(preset.url())
                .map_err(EnvironmentError::from)
                .and_then(|bytes| EnvironmentMap::from_hdr_bytes(&bytes))
                .map(Arc::new);
            reply.send(EnvironmentOutcome { preset, result });
        });
        generation
    }

    pub fn poll(&mut self) -> EnvironmentPoll {
        let (outcomes, superseded) = self.queue.drain_counting_stale();
        if !outcomes.is_empty() {
            self.in_flight = None;
        }
        EnvironmentPoll {
            outcomes,
            superseded,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Flat (non-RLE) Radiance file, `width` must stay below 8.
    pub fn tiny_hdr(width: u32, height: u32, rgbe: [u8; 4]) -> Vec<u8> {
        let mut bytes = format!(
            "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {} +X {}\n",
            height, width
        )
        .into_bytes();
        for _ in 0..width * height {
            bytes.extend_from_slice(&rgbe);
        }
        bytes
    }
}
