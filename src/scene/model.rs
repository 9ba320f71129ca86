use super::material::{is_metal_like, MaterialDescriptor, MaterialPolicy, MaterialSelection};
use super::procedural::{self, BAND_MATERIAL};
use super::{Model, ModelStats, SceneGraph};

/// Outcome of applying a material selection, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub metal_nodes: usize,
    pub other_nodes: usize,
    pub updated_materials: usize,
}

/// Owns the procedural ring while it is off-scene and decides what gets attached.
#[derive(Debug)]
pub struct ModelManager {
    retained_procedural: Option<Model>,
    target_size: f32,
    policy: MaterialPolicy,
}

impl ModelManager {
    pub fn new(target_size: f32, policy: MaterialPolicy) -> Self {
        Self {
            retained_procedural: None,
            target_size,
            policy,
        }
    }

    pub fn has_model(&self, scene: &SceneGraph) -> bool {
        scene.active_model().is_some() || self.retained_procedural.is_some()
    }

    /// Attaches the procedural ring, building it only the first time.
    pub fn create_default_model(
        &mut self,
        scene: &mut SceneGraph,
        band: MaterialDescriptor,
    ) -> ModelStats {
        if let Some(model) = scene.active_model() {
            if model.is_procedural() {
                return model.stats();
            }
        }
        let ring = match self.retained_procedural.take() {
            Some(ring) => ring,
            None => {
                let ring = procedural::build_ring(band);
                log::info!("Built procedural ring {:?}", ring.id());
                ring
            }
        };
        self.attach(scene, ring)
    }

    /// Normalizes `model` and makes it the active one, retiring the previous model.
    pub fn attach_external(&mut self, scene: &mut SceneGraph, mut model: Model) -> ModelStats {
        model.normalize(self.target_size);
        let bounds = model.bounding_box();
        log::debug!(
            "Normalized {:?}: centre {:?}, extent {:.3}",
            model.kind(),
            bounds.center(),
            bounds.max_extent()
        );
        self.attach(scene, model)
    }

    /// Drops any external model and puts the original ring back.
    pub fn reset(&mut self, scene: &mut SceneGraph, band: MaterialDescriptor) -> ModelStats {
        if let Some(model) = scene.active_model() {
            if model.is_procedural() {
                return model.stats();
            }
        }
        if let Some(previous) = scene.detach() {
            log::info!("Disposing external model {:?}", previous.id());
        }
        self.create_default_model(scene, band)
    }

    pub fn apply_material(
        &mut self,
        scene: &mut SceneGraph,
        selection: MaterialSelection,
    ) -> ApplyReport {
        let descriptor = selection.descriptor();
        let environment = scene.environment.clone();
        let policy = self.policy;
        let Some(model) = scene.active_model_mut() else {
            return ApplyReport::default();
        };

        if model.is_procedural() {
            let Some(band) = model.materials.get_mut(BAND_MATERIAL) else {
                return ApplyReport::default();
            };
            band.apply_descriptor(descriptor);
            return ApplyReport {
                metal_nodes: 1,
                other_nodes: 0,
                updated_materials: 1,
            };
        }

        let mut report = ApplyReport::default();
        // Materials can be shared between nodes; mark first so each is updated once.
        let mut targets = vec![false; model.materials.len()];
        for node in &model.nodes {
            let metal = is_metal_like(&node.name, model.material_for(node));
            if metal {
                report.metal_nodes += 1;
            } else {
                report.other_nodes += 1;
            }
            let update = match policy {
                MaterialPolicy::Uniform => true,
                MaterialPolicy::MetalOnly => metal,
            };
            if update {
                if let Some(slot) = targets.get_mut(node.material) {
                    *slot = true;
                }
            }
        }
        for (material, _) in model
            .materials
            .iter_mut()
            .zip(&targets)
            .filter(|(_, target)| **target)
        {
            material.apply_descriptor(descriptor);
            material.set_environment(environment.clone());
            report.updated_materials += 1;
        }
        log::debug!(
            "Applied {:?} ({:?}): {} metal / {} other meshes, {} materials updated",
            selection,
            policy,
            report.metal_nodes,
            report.other_nodes,
            report.updated_materials
        );
        report
    }

    /// Pushes the scene's environment to the active model and the retained ring.
    pub fn bind_environment(&mut self, scene: &mut SceneGraph) -> usize {
        let environment = scene.environment.clone();
        let mut bound = 0;
        if let Some(model) = scene.active_model_mut() {
            model.bind_environment(environment.as_ref());
            bound += model.materials.len();
        }
        if let Some(ring) = self.retained_procedural.as_mut() {
            ring.bind_environment(environment.as_ref());
            bound += ring.materials.len();
        }
        bound
    }

    fn attach(&mut self, scene: &mut SceneGraph, model: Model) -> ModelStats {
        let stats = model.stats();
        if let Some(previous) = scene.attach(model) {
            if previous.is_procedural() {
                self.retained_procedural = Some(previous);
            } else {
                log::info!("Disposing external model {:?}", previous.id());
            }
        }
        stats
    }
}
