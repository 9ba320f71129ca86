mod bloom;
pub mod camera;
pub mod raster;
pub mod shading;

pub use bloom::BloomPipeline;
pub use camera::{compute_framing, Camera, CameraMode, CameraPreset, Framing, OrbitControls};

use crate::config::ViewerConfig;
use crate::scene::SceneGraph;
use glam::{Mat3, Vec3};
use raster::{ClipVertex, Framebuffer};
use shading::ShadingContext;
use std::path::{Path, PathBuf};

const BACKGROUND_TOP: Vec3 = Vec3::new(0.045, 0.045, 0.055);
const BACKGROUND_BOTTOM: Vec3 = Vec3::new(0.012, 0.012, 0.016);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("post-processing is disabled")]
    PostProcessingDisabled,
    #[error("invalid bloom settings: {0}")]
    InvalidBloom(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("nothing to capture: the viewport is empty")]
    EmptyViewport,
    #[error("failed creating screenshot directory '{}': {}", .path.display(), .source)]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing screenshot '{}': {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Per-frame counters shown in the stats overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub triangles: usize,
    pub post_processed: bool,
}

pub struct RenderContext {
    framebuffer: Framebuffer,
    bloom: Option<BloomPipeline>,
    exposure: f32,
    rgba: Vec<u8>,
}

impl RenderContext {
    /// Falls back to direct rendering when the bloom pipeline can't be built;
    /// the decision holds for the session's lifetime.
    pub fn new(config: &ViewerConfig) -> Self {
        let bloom = match BloomPipeline::new(&config.bloom) {
            Ok(pipeline) => {
                log::info!("Bloom post-processing enabled.");
                Some(pipeline)
            }
            Err(err) => {
                log::warn!("Bloom unavailable ({}); rendering without post-processing.", err);
                None
            }
        };
        Self {
            framebuffer: Framebuffer::new(1, 1),
            bloom,
            exposure: config.exposure,
            rgba: Vec::new(),
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.framebuffer.width, self.framebuffer.height)
    }

    pub fn set_size(&mut self, width: usize, height: usize) {
        self.framebuffer.resize(width, height);
    }

    /// Tone-mapped RGBA8 of the last rendered frame.
    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }

    pub fn render(&mut self, scene: &SceneGraph, camera: &Camera) -> FrameReport {
        let fb = &mut self.framebuffer;
        fb.clear_gradient(BACKGROUND_TOP, BACKGROUND_BOTTOM);
        let mut report = FrameReport::default();

        if let Some(model) = scene.active_model() {
            let aspect = fb.width as f32 / fb.height.max(1) as f32;
            let view_proj = camera.view_projection(aspect);
            let ctx = ShadingContext {
                lights: &scene.lights,
                eye: camera.position,
            };
            let mut vertices = Vec::new();
            for node in &model.nodes {
                let Some(material) = model.material_for(node) else {
                    continue;
                };
                let transform = model.node_transform(node);
                let linear = Mat3::from_mat4(transform);
                let normal_matrix = if linear.determinant().abs() > 1e-12 {
                    linear.inverse().transpose()
                } else {
                    linear
                };
                vertices.clear();
                vertices.extend(node.mesh.positions.iter().enumerate().map(|(i, position)| {
                    let world = transform.transform_point3(*position);
                    let normal = node.mesh.normals.get(i).copied().unwrap_or(Vec3::ZERO);
                    ClipVertex {
                        clip: view_proj * world.extend(1.0),
                        world,
                        normal: (normal_matrix * normal).normalize_or_zero(),
                    }
                }));
                report.triangles += fb.draw_triangles(&vertices, &node.mesh.indices, |world, normal| {
                    ctx.shade(material, world, normal)
                });
            }
        }

        if let Some(bloom) = self.bloom.as_mut() {
            bloom.apply(fb);
            report.post_processed = true;
        }
        raster::encode_rgba8(&fb.color, self.exposure, &mut self.rgba);
        report
    }

    /// Renders at `scale` times the current size into `dir`, then restores the
    /// previous size whether or not the capture succeeded.
    pub fn capture_screenshot(
        &mut self,
        scene: &SceneGraph,
        camera: &Camera,
        dir: &Path,
        scale: u32,
    ) -> Result<PathBuf, ScreenshotError> {
        let (width, height) = self.size();
        let scale = scale.max(1) as usize;
        self.set_size(width * scale, height * scale);
        let result = self.render_to_file(scene, camera, dir);
        self.set_size(width, height);
        result
    }

    fn render_to_file(
        &mut self,
        scene: &SceneGraph,
        camera: &Camera,
        dir: &Path,
    ) -> Result<PathBuf, ScreenshotError> {
        let (width, height) = self.size();
        if width == 0 || height == 0 {
            return Err(ScreenshotError::EmptyViewport);
        }
        self.render(scene, camera);
        let path = dir.join(screenshot_file_name());
        save_png(&path, width as u32, height as u32, &self.rgba)?;
        log::info!("Saved {}x{} screenshot to {}", width, height, path.display());
        Ok(path)
    }
}

fn screenshot_file_name() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("jewellery-{}.png", millis)
}

fn save_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<(), ScreenshotError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ScreenshotError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    image::save_buffer_with_format(
        path,
        pixels,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|source| ScreenshotError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BloomSettings;
    use crate::scene::material::MetalPreset;
    use crate::scene::ModelManager;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("jewel-viewer-{}-{}", name, nanos));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ring_scene() -> SceneGraph {
        let mut scene = SceneGraph::with_default_lights();
        let mut models = ModelManager::new(2.0, Default::default());
        models.create_default_model(&mut scene, MetalPreset::Gold.descriptor());
        scene.compile_materials();
        scene
    }

    fn front_camera(scene: &SceneGraph) -> Camera {
        let framing = compute_framing(CameraPreset::Front, &scene.active_bounds());
        OrbitControls::new(framing, 0.5).camera()
    }

    #[test]
    fn renders_the_ring_over_the_background() {
        let scene = ring_scene();
        let camera = front_camera(&scene);
        let mut renderer = RenderContext::new(&ViewerConfig::default());
        renderer.set_size(64, 48);

        renderer.render(&SceneGraph::with_default_lights(), &camera);
        let background = renderer.pixels().to_vec();
        let report = renderer.render(&scene, &camera);
        assert!(report.triangles > 0);
        assert_eq!(renderer.pixels().len(), 64 * 48 * 4);

        let changed = background
            .chunks_exact(4)
            .zip(renderer.pixels().chunks_exact(4))
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed > 20, "only {} pixels covered", changed);
        // Corner stays background.
        assert_eq!(&background[0..4], &renderer.pixels()[0..4]);
    }

    #[test]
    fn disabled_bloom_latches_direct_rendering() {
        let config = ViewerConfig {
            bloom: BloomSettings {
                enabled: false,
                ..BloomSettings::default()
            },
            ..ViewerConfig::default()
        };
        let scene = ring_scene();
        let mut renderer = RenderContext::new(&config);
        renderer.set_size(16, 16);
        for _ in 0..3 {
            assert!(!renderer.render(&scene, &front_camera(&scene)).post_processed);
        }
        let mut default = RenderContext::new(&ViewerConfig::default());
        default.set_size(16, 16);
        assert!(default.render(&scene, &front_camera(&scene)).post_processed);
    }

    #[test]
    fn screenshot_is_written_at_double_size_and_size_restored() {
        let scene = ring_scene();
        let camera = front_camera(&scene);
        let mut renderer = RenderContext::new(&ViewerConfig::default());
        renderer.set_size(20, 10);
        let dir = temp_dir("shot");

        let path = renderer.capture_screenshot(&scene, &camera, &dir, 2).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("jewellery-") && name.ends_with(".png"));
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (40, 20));
        assert_eq!(renderer.size(), (20, 10));
        assert_eq!(renderer.pixels().len(), 40 * 20 * 4);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn failed_screenshot_still_restores_size() {
        let scene = ring_scene();
        let camera = front_camera(&scene);
        let mut renderer = RenderContext::new(&ViewerConfig::default());
        renderer.set_size(12, 8);
        let dir = temp_dir("blocked");
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = renderer
            .capture_screenshot(&scene, &camera, &blocker.join("shots"), 2)
            .unwrap_err();
        assert!(matches!(err, ScreenshotError::CreateDir { .. }));
        assert_eq!(renderer.size(), (12, 8));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn empty_viewport_cannot_be_captured() {
        let scene = ring_scene();
        let mut renderer = RenderContext::new(&ViewerConfig::default());
        renderer.set_size(0, 0);
        let err = renderer
            .capture_screenshot(&scene, &front_camera(&scene), &std::env::temp_dir(), 2)
            .unwrap_err();
        assert!(matches!(err, ScreenshotError::EmptyViewport));
        assert_eq!(renderer.size(), (0, 0));
    }
}
