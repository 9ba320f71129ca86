pub mod environment;
pub mod fetch;

use crate::scene::material::{PbrMaterial, Rgb};
use crate::scene::{Mesh, MeshNode, Model, ModelKind};
use fetch::{CompletionQueue, Dispatch, Fetch, FetchError, Generation};
use glam::{Mat4, Vec3};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// URL shorteners that resolve to HTML pages rather than model files.
const SHORT_LINK_HOSTS: &[&str] = &["skfb.ly", "bit.ly", "tinyurl.com", "t.co", "goo.gl"];

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read model at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to parse glTF {label}: {source}")]
    Parse {
        label: String,
        #[source]
        source: gltf::Error,
    },
    #[error("mesh {name} has no position data")]
    MissingPositions { name: String },
    #[error("model {label} contains no triangle meshes")]
    EmptyModel { label: String },
    #[error("not an http(s) model URL: {url}")]
    InvalidUrl { url: String },
    #[error("short links are not supported, paste the direct .glb URL instead: {url}")]
    UnsupportedShortLink { url: String },
}

#[derive(Debug, Clone)]
pub enum ModelSource {
    Url(String),
    Bytes { name: String, bytes: Arc<[u8]> },
    File(PathBuf),
}

impl ModelSource {
    pub fn label(&self) -> String {
        match self {
            ModelSource::Url(url) => url.clone(),
            ModelSource::Bytes { name, .. } => name.clone(),
            ModelSource::File(path) => path
                .file_name()
                .and_then(|value| value.to_str())
                .unwrap_or("model")
                .to_string(),
        }
    }

    /// Drag-and-drop / file dialog sources, as opposed to remote URLs.
    pub fn is_local(&self) -> bool {
        !matches!(self, ModelSource::Url(_))
    }
}

/// Rejects anything that is not a plain http(s) URL, and known short-link hosts.
pub fn check_model_url(url: &str) -> Result<(), AssetError> {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| AssetError::InvalidUrl {
            url: trimmed.to_string(),
        })?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority
        .rsplit('@')
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if host.is_empty() {
        return Err(AssetError::InvalidUrl {
            url: trimmed.to_string(),
        });
    }
    let short = SHORT_LINK_HOSTS
        .iter()
        .any(|short| host == *short || host.ends_with(&format!(".{short}")));
    if short {
        return Err(AssetError::UnsupportedShortLink {
            url: trimmed.to_string(),
        });
    }
    Ok(())
}

/// GLB or self-contained glTF held in memory.
pub fn import_gltf_slice(bytes: &[u8], label: &str) -> Result<Model, AssetError> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).map_err(|source| AssetError::Parse {
            label: label.to_string(),
            source,
        })?;
    build_model(&document, &buffers, label)
}

/// glTF on disk; sibling `.bin` files are resolved relative to it.
pub fn import_gltf_path(path: &Path) -> Result<Model, AssetError> {
    let label = path.display().to_string();
    if !path.exists() {
        return Err(AssetError::Read {
            path: label,
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }
    let (document, buffers, _images) =
        gltf::import(path).map_err(|source| AssetError::Parse {
            label: label.clone(),
            source,
        })?;
    build_model(&document, &buffers, &label)
}

fn build_model(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    label: &str,
) -> Result<Model, AssetError> {
    let mut materials: Vec<PbrMaterial> = document.materials().map(convert_material).collect();
    // Primitives without a material share one default slot appended at the end.
    let fallback_material = materials.len();
    let mut used_fallback = false;
    let mut nodes = Vec::new();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::EmptyModel {
            label: label.to_string(),
        })?;
    for node in scene.nodes() {
        collect_node(
            &node,
            Mat4::IDENTITY,
            buffers,
            fallback_material,
            &mut used_fallback,
            &mut nodes,
        )?;
    }
    if nodes.is_empty() {
        return Err(AssetError::EmptyModel {
            label: label.to_string(),
        });
    }
    if used_fallback {
        materials.push(PbrMaterial::default());
    }

    let name = Path::new(label)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or(label)
        .to_string();
    Ok(Model::new(ModelKind::External { label: name }, nodes, materials))
}

fn collect_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    fallback_material: usize,
    used_fallback: &mut bool,
    out: &mut Vec<MeshNode>,
) -> Result<(), AssetError> {
    // World transform baked per node.
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        let base_name = node
            .name()
            .or_else(|| mesh.name())
            .unwrap_or("mesh")
            .to_string();
        let primitive_count = mesh.primitives().count();
        for (index, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::debug!("Skipping non-triangle primitive in {}", base_name);
                continue;
            }
            let name = if primitive_count > 1 {
                format!("{}_{}", base_name, index)
            } else {
                base_name.clone()
            };
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let positions: Vec<Vec3> = reader
                .read_positions()
                .ok_or_else(|| AssetError::MissingPositions { name: name.clone() })?
                .map(Vec3::from)
                .collect();
            // Non-indexed primitives list their vertices in triangle order.
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let normals: Vec<Vec3> = reader
                .read_normals()
                .map(|normals| normals.map(Vec3::from).collect())
                .unwrap_or_default();

            let mut mesh = Mesh {
                positions,
                normals,
                indices,
            };
            if mesh.normals.len() != mesh.positions.len() {
                mesh.compute_normals();
            }
            let material = match primitive.material().index() {
                Some(index) => index,
                None => {
                    *used_fallback = true;
                    fallback_material
                }
            };
            out.push(MeshNode {
                name,
                mesh,
                world,
                material,
            });
        }
    }

    for child in node.children() {
        collect_node(&child, world, buffers, fallback_material, used_fallback, out)?;
    }
    Ok(())
}

fn convert_material(material: gltf::Material) -> PbrMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _alpha] = pbr.base_color_factor();
    let mut converted = PbrMaterial::default();
    converted.name = material.name().unwrap_or("material").to_string();
    converted.color = Rgb::from_linear(Vec3::new(r, g, b));
    converted.metalness = pbr.metallic_factor();
    converted.roughness = pbr.roughness_factor();
    converted
}

pub struct ModelOutcome {
    pub label: String,
    pub local: bool,
    pub result: Result<Model, AssetError>,
}

/// Reads, downloads and parses external models off the UI thread.
pub struct ModelLoader {
    fetcher: Arc<dyn Fetch>,
    dispatch: Dispatch,
    queue: CompletionQueue<ModelOutcome>,
    in_flight: Option<String>,
}

impl ModelLoader {
    pub fn new(fetcher: Arc<dyn Fetch>, dispatch: Dispatch) -> Self {
        Self {
            fetcher,
            dispatch,
            queue: CompletionQueue::new("model"),
            in_flight: None,
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// URL sources are validated before anything is started.
    pub fn request(&mut self, source: ModelSource) -> Result<Generation, AssetError> {
        if let ModelSource::Url(url) = &source {
            check_model_url(url)?;
        }
        let (generation, reply) = self.queue.begin();
        let label = source.label();
        let local = source.is_local();
        log::info!("Loading model {} (request {})", label, reply.generation());
        if let Some(previous) = self.in_flight.replace(label.clone()) {
            log::debug!("Model load {} superseded by {}", previous, label);
        }

        let fetcher = Arc::clone(&self.fetcher);
        self.dispatch.run("model-load", move || {
            let result = match &source {
                ModelSource::Url(url) => fetcher
                    .fetch(url.trim())
                    .map_err(AssetError::from)
                    .and_then(|bytes| import_gltf_slice(&bytes, &label)),
                ModelSource::Bytes { name, bytes } => import_gltf_slice(bytes, name),
                ModelSource::File(path) => import_gltf_path(path),
            };
            reply.send(ModelOutcome {
                label,
                local,
                result,
            });
        });
        Ok(generation)
    }

    pub fn poll(&mut self) -> Vec<ModelOutcome> {
        let outcomes = self.queue.drain();
        if !outcomes.is_empty() {
            self.in_flight = None;
        }
        outcomes
    }
}


#[cfg(test)]
mod tests {
    use super::fetch::test_support::StubFetcher;
    use super::test_support::two_box_glb;
    use super::*;
    use crate::scene::material::is_metal_like;

    #[test]
    fn imports_glb_hierarchy() {
        let model = import_gltf_slice(&two_box_glb(), "rings/two_box.glb").unwrap();
        assert_eq!(
            model.kind(),
            &ModelKind::External {
                label: "two_box.glb".to_string()
            }
        );
        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.materials.len(), 2);
        let stats = model.stats();
        assert_eq!(stats.vertices, 16);
        assert_eq!(stats.faces, 24);

        let bounds = model.bounding_box();
        assert!((bounds.min - Vec3::new(2.0, -1.0, 4.0)).length() < 1e-5);
        assert!((bounds.max - Vec3::new(12.0, 6.0, 6.0)).length() < 1e-5);
        assert!(model.nodes.iter().all(|node| node.mesh.normals.len() == 8));
    }

    #[test]
    fn imported_materials_drive_classification() {
        let model = import_gltf_slice(&two_box_glb(), "two_box.glb").unwrap();
        let band = &model.nodes[0];
        let stone = &model.nodes[1];
        assert!(is_metal_like(&band.name, model.material_for(band)));
        assert!(!is_metal_like(&stone.name, model.material_for(stone)));
        assert_eq!(model.materials[0].metalness, 1.0);
        assert!((model.materials[1].roughness - 0.05).abs() < 1e-6);
    }

    #[test]
    fn malformed_bytes_fail_to_parse() {
        let err = import_gltf_slice(b"glTF\x02\0\0\0garbage", "broken.glb").unwrap_err();
        assert!(matches!(err, AssetError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = import_gltf_path(Path::new("/definitely/not/here.gltf")).unwrap_err();
        assert!(matches!(err, AssetError::Read { .. }));
    }

    #[test]
    fn url_checks() {
        assert!(check_model_url("https://example.com/models/ring.glb").is_ok());
        assert!(check_model_url("http://cdn.example.com:8080/ring.glb?v=2").is_ok());
        assert!(matches!(
            check_model_url("https://skfb.ly/abc123"),
            Err(AssetError::UnsupportedShortLink { .. })
        ));
        assert!(matches!(
            check_model_url("https://www.bit.ly/xyz"),
            Err(AssetError::UnsupportedShortLink { .. })
        ));
        assert!(matches!(
            check_model_url("ftp://example.com/ring.glb"),
            Err(AssetError::InvalidUrl { .. })
        ));
        assert!(matches!(
            check_model_url("https:///ring.glb"),
            Err(AssetError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn short_links_never_reach_the_network() {
        let fetcher = Arc::new(StubFetcher::default());
        let mut loader = ModelLoader::new(fetcher.clone(), Dispatch::Inline);
        let err = loader
            .request(ModelSource::Url("https://skfb.ly/oAbCd".to_string()))
            .unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedShortLink { .. }));
        assert!(fetcher.requests.lock().unwrap().is_empty());
        assert!(loader.in_flight().is_none());
    }

    #[test]
    fn loader_fetches_and_parses_urls() {
        let url = "https://example.com/ring.glb";
        let fetcher = Arc::new(StubFetcher::default().with(url, two_box_glb()));
        let mut loader = ModelLoader::new(fetcher, Dispatch::Inline);
        loader.request(ModelSource::Url(url.to_string())).unwrap();
        let outcomes = loader.poll();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].local);
        assert_eq!(outcomes[0].result.as_ref().unwrap().nodes.len(), 2);
    }

    #[test]
    fn superseded_model_load_is_discarded() {
        let fetcher = Arc::new(StubFetcher::default());
        let mut loader = ModelLoader::new(fetcher, Dispatch::Inline);
        loader
            .request(ModelSource::Bytes {
                name: "first.glb".to_string(),
                bytes: Arc::from(two_box_glb()),
            })
            .unwrap();
        loader
            .request(ModelSource::Bytes {
                name: "second.glb".to_string(),
                bytes: Arc::from(two_box_glb()),
            })
            .unwrap();
        let outcomes = loader.poll();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].label, "second.glb");
        assert!(outcomes[0].local);
    }
}
