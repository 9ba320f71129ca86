pub mod material;
pub mod model;
pub mod procedural;

use crate::assets::environment::EnvironmentMap;
use glam::{Mat4, Vec3};
use material::PbrMaterial;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use model::ModelManager;

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Area-weighted smooth normals, used when an asset ships without them.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let face = (self.positions[b] - self.positions[a])
                .cross(self.positions[c] - self.positions[a]);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
            .collect();
    }
}

/// One drawable: geometry baked into model space plus an index into the model's material table.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub name: String,
    pub mesh: Mesh,
    pub world: Mat4,
    pub material: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

impl ModelId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelKind {
    Procedural,
    External { label: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelStats {
    pub vertices: usize,
    pub faces: usize,
    pub materials: usize,
}

/// A displayable object. Not `Clone`: moving it around keeps its identity.
#[derive(Debug)]
pub struct Model {
    id: ModelId,
    kind: ModelKind,
    pub nodes: Vec<MeshNode>,
    pub materials: Vec<PbrMaterial>,
    /// Normalization transform applied on top of every node's world matrix.
    pub root: Mat4,
}

impl Model {
    pub fn new(kind: ModelKind, nodes: Vec<MeshNode>, materials: Vec<PbrMaterial>) -> Self {
        Self {
            id: ModelId::next(),
            kind,
            nodes,
            materials,
            root: Mat4::IDENTITY,
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn is_procedural(&self) -> bool {
        matches!(self.kind, ModelKind::Procedural)
    }

    pub fn node_transform(&self, node: &MeshNode) -> Mat4 {
        self.root * node.world
    }

    pub fn bounding_box(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for node in &self.nodes {
            let transform = self.node_transform(node);
            for position in &node.mesh.positions {
                bounds.extend(transform.transform_point3(*position));
            }
        }
        bounds
    }

    /// Re-centres the model at the origin and scales it uniformly so the largest
    /// bounding-box dimension equals `target_size`.
    pub fn normalize(&mut self, target_size: f32) {
        // Measure in model space, ignoring any previous normalization.
        self.root = Mat4::IDENTITY;
        let bounds = self.bounding_box();
        let extent = bounds.max_extent();
        if bounds.is_empty() || extent <= f32::EPSILON {
            // Degenerate: centre only.
            self.root = Mat4::from_translation(-bounds.center());
            return;
        }
        let scale = target_size / extent;
        self.root = Mat4::from_scale(Vec3::splat(scale)) * Mat4::from_translation(-bounds.center());
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            vertices: self.nodes.iter().map(|node| node.mesh.vertex_count()).sum(),
            faces: self.nodes.iter().map(|node| node.mesh.face_count()).sum(),
            materials: self.materials.len(),
        }
    }

    pub fn material_for(&self, node: &MeshNode) -> Option<&PbrMaterial> {
        self.materials.get(node.material)
    }

    pub fn bind_environment(&mut self, environment: Option<&Arc<EnvironmentMap>>) {
        for material in &mut self.materials {
            material.set_environment(environment.cloned());
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    /// Position the light shines from; it always points at the origin.
    pub position: Vec3,
}

impl DirectionalLight {
    pub fn direction_to_light(&self) -> Vec3 {
        self.position.try_normalize().unwrap_or(Vec3::Y)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct LightRig {
    pub ambient: AmbientLight,
    pub key: DirectionalLight,
    pub points: [PointLight; 2],
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            ambient: AmbientLight {
                color: Vec3::ONE,
                intensity: 0.4,
            },
            key: DirectionalLight {
                color: Vec3::ONE,
                intensity: 1.0,
                position: Vec3::new(5.0, 5.0, 5.0),
            },
            points: [
                PointLight {
                    color: Vec3::ONE,
                    intensity: 0.5,
                    position: Vec3::new(-5.0, 5.0, 5.0),
                },
                PointLight {
                    color: Vec3::new(1.0, 0.95, 0.9),
                    intensity: 0.3,
                    position: Vec3::new(5.0, -5.0, -5.0),
                },
            ],
        }
    }
}

/// Root scene: lights, optional environment and at most one active model.
#[derive(Debug, Default)]
pub struct SceneGraph {
    pub lights: LightRig,
    pub environment: Option<Arc<EnvironmentMap>>,
    active_model: Option<Model>,
}

impl SceneGraph {
    pub fn with_default_lights() -> Self {
        Self {
            lights: LightRig::default(),
            environment: None,
            active_model: None,
        }
    }

    pub fn active_model(&self) -> Option<&Model> {
        self.active_model.as_ref()
    }

    pub fn active_model_mut(&mut self) -> Option<&mut Model> {
        self.active_model.as_mut()
    }

    /// Attaches `model`, handing back whatever was attached before.
    pub fn attach(&mut self, mut model: Model) -> Option<Model> {
        model.bind_environment(self.environment.as_ref());
        self.active_model.replace(model)
    }

    pub fn detach(&mut self) -> Option<Model> {
        self.active_model.take()
    }

    pub fn active_bounds(&self) -> Aabb {
        self.active_model
            .as_ref()
            .map(Model::bounding_box)
            .unwrap_or_else(|| Aabb::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0)))
    }

    /// Recompiles every material flagged since the last frame.
    pub fn compile_materials(&mut self) -> usize {
        let Some(model) = self.active_model.as_mut() else {
            return 0;
        };
        let mut compiled = 0;
        for material in &mut model.materials {
            if material.needs_update() {
                material.compile();
                compiled += 1;
            }
        }
        compiled
    }
}
