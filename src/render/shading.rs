use crate::scene::material::PbrMaterial;
use crate::scene::LightRig;
use glam::Vec3;
use std::f32::consts::PI;

/// Point lights are authored for a roughly unit-sized scene.
const POINT_FALLOFF: f32 = 0.02;
const MIN_ROUGHNESS: f32 = 0.04;
/// Gem facets keep a little highlight spread so sparkles stay visible.
const GEM_HIGHLIGHT_ROUGHNESS: f32 = 0.08;

pub trait OpticsVecExt {
    fn reflect_about(self, normal: Vec3) -> Vec3;
    /// `None` on total internal reflection.
    fn refract_through(self, normal: Vec3, ior: f32) -> Option<Vec3>;
}

impl OpticsVecExt for Vec3 {
    fn reflect_about(self, normal: Vec3) -> Vec3 {
        self - 2.0 * self.dot(normal) * normal
    }

    fn refract_through(self, mut normal: Vec3, ior: f32) -> Option<Vec3> {
        let mut cosi = self.dot(normal);
        let (mut etai, mut etat) = (1.0, ior);
        if cosi < 0.0 {
            cosi = -cosi;
        } else {
            std::mem::swap(&mut etai, &mut etat);
            normal = -normal;
        }
        let eta = etai / etat;
        let k = 1.0 - eta * eta * (1.0 - cosi * cosi);
        if k < 0.0 {
            None
        } else {
            Some(eta * self + (eta * cosi - k.sqrt()) * normal)
        }
    }
}

/// Schlick reflectance at an air/dielectric boundary.
pub fn reflectance(cos: f32, ior: f32) -> f32 {
    let r0 = (1.0 - ior) / (1.0 + ior);
    let r0 = r0 * r0;
    r0 + (1.0 - r0) * (1.0 - cos.clamp(0.0, 1.0)).powi(5)
}

pub struct ShadingContext<'a> {
    pub lights: &'a LightRig,
    pub eye: Vec3,
}

impl ShadingContext<'_> {
    /// Outgoing radiance towards the eye from `position`.
    pub fn shade(&self, material: &PbrMaterial, position: Vec3, normal: Vec3) -> Vec3 {
        let view = (self.eye - position).normalize_or_zero();
        let mut normal = normal.normalize_or_zero();
        if normal == Vec3::ZERO {
            normal = view;
        }
        // Meshes are double-sided.
        if normal.dot(view) < 0.0 {
            normal = -normal;
        }

        let transmission = material.transmission.clamp(0.0, 1.0);
        let mut color = Vec3::ZERO;
        if transmission < 1.0 {
            color += self.opaque(material, position, normal, view) * (1.0 - transmission);
        }
        if transmission > 0.0 {
            color += self.transmissive(material, position, normal, view) * transmission;
        }
        color
    }

    fn opaque(&self, material: &PbrMaterial, position: Vec3, normal: Vec3, view: Vec3) -> Vec3 {
        let compiled = material.compiled();
        let metalness = material.metalness.clamp(0.0, 1.0);
        let roughness = material.roughness.clamp(MIN_ROUGHNESS, 1.0);
        // Dielectrics reflect ~4%; metals tint reflection with their albedo and lose diffuse.
        let f0 = Vec3::splat(0.04).lerp(compiled.albedo, metalness);
        let diffuse = compiled.albedo * (1.0 - metalness);
        let n_dot_v = normal.dot(view).max(1e-4);

        let mut color = self.direct(normal, view, position, diffuse, f0, roughness);

        let ambient = self.lights.ambient.color * self.lights.ambient.intensity;
        color += diffuse * ambient;

        let reflected = (-view).reflect_about(normal);
        // Roughness-aware Schlick: rough surfaces get a weaker grazing boost.
        let fresnel = f0 + (Vec3::splat(1.0 - roughness).max(f0) - f0) * (1.0 - n_dot_v).powi(5);
        let specular_env = self.environment(material, reflected, compiled.env_level);
        // Blurriest level stands in for irradiance.
        let diffuse_env = self.environment(material, normal, f32::MAX);
        color += specular_env * fresnel * material.env_intensity;
        color += diffuse_env * diffuse * material.env_intensity;
        color
    }

    fn transmissive(&self, material: &PbrMaterial, position: Vec3, normal: Vec3, view: Vec3) -> Vec3 {
        let compiled = material.compiled();
        let incoming = -view;
        let cos = view.dot(normal);
        let fresnel = reflectance(cos, material.ior);

        let reflected = self.environment(material, incoming.reflect_about(normal), 0.0);
        let transmitted = match incoming.refract_through(normal, material.ior) {
            Some(direction) => self.environment(material, direction, compiled.env_level) * compiled.albedo,
            // Total internal reflection.
            None => reflected,
        };
        let mut color =
            (transmitted * (1.0 - fresnel) + reflected * fresnel) * material.env_intensity;
        color += self.direct(
            normal,
            view,
            position,
            Vec3::ZERO,
            // Diamond's normal-incidence reflectance, ((2.417 - 1) / (2.417 + 1))^2.
            Vec3::splat(fresnel.max(0.17)),
            GEM_HIGHLIGHT_ROUGHNESS,
        );
        color
    }

    fn direct(&self, normal: Vec3, view: Vec3, position: Vec3, diffuse: Vec3, f0: Vec3, roughness: f32) -> Vec3 {
        let key = &self.lights.key;
        let mut color = brdf(
            normal,
            view,
            key.direction_to_light(),
            diffuse,
            f0,
            roughness,
        ) * key.color
            * key.intensity;
        for light in &self.lights.points {
            let to_light = light.position - position;
            let distance_sq = to_light.length_squared();
            let Some(direction) = to_light.try_normalize() else {
                continue;
            };
            let attenuation = 1.0 / (1.0 + POINT_FALLOFF * distance_sq);
            color += brdf(normal, view, direction, diffuse, f0, roughness)
                * light.color
                * light.intensity
                * attenuation;
        }
        color
    }

    fn environment(&self, material: &PbrMaterial, direction: Vec3, level: f32) -> Vec3 {
        match material.environment() {
            Some(env) => env.sample(direction, level),
            None => fallback_sky(direction),
        }
    }
}

/// Cook-Torrance (GGX, Smith-Schlick, Schlick Fresnel) plus Lambert, times n.l.
fn brdf(normal: Vec3, view: Vec3, light: Vec3, diffuse: Vec3, f0: Vec3, roughness: f32) -> Vec3 {
    let n_dot_l = normal.dot(light);
    if n_dot_l <= 0.0 {
        return Vec3::ZERO;
    }
    let n_dot_v = normal.dot(view).max(1e-4);
    let half = (view + light).normalize_or_zero();
    let n_dot_h = normal.dot(half).max(0.0);
    let v_dot_h = view.dot(half).max(0.0);

    let alpha = roughness * roughness;
    let alpha_sq = alpha * alpha;
    let denom = n_dot_h * n_dot_h * (alpha_sq - 1.0) + 1.0;
    let distribution = alpha_sq / (PI * denom * denom);

    // Remapped k for analytic lights.
    let k = (roughness + 1.0) * (roughness + 1.0) / 8.0;
    let geometry = (n_dot_v / (n_dot_v * (1.0 - k) + k)) * (n_dot_l / (n_dot_l * (1.0 - k) + k));
    let fresnel = f0 + (Vec3::ONE - f0) * (1.0 - v_dot_h).powi(5);

    let specular = fresnel * (distribution * geometry / (4.0 * n_dot_v * n_dot_l));
    let kd = (Vec3::ONE - fresnel) * diffuse / PI;
    (kd + specular) * n_dot_l
}

/// Soft studio gradient used until an HDR environment arrives.
fn fallback_sky(direction: Vec3) -> Vec3 {
    let up = direction.normalize_or_zero().y * 0.5 + 0.5;
    Vec3::splat(0.03).lerp(Vec3::new(0.55, 0.56, 0.6), up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::environment::EnvironmentMap;
    use crate::scene::material::{MetalPreset, PbrMaterial};
    use std::sync::Arc;

    fn context(lights: &LightRig) -> ShadingContext<'_> {
        ShadingContext {
            lights,
            eye: Vec3::new(0.0, 0.0, 5.0),
        }
    }

    #[test]
    fn reflectance_grows_at_grazing_angles() {
        let head_on = reflectance(1.0, 2.417);
        let grazing = reflectance(0.05, 2.417);
        assert!((head_on - 0.172).abs() < 1e-2);
        assert!(grazing > 0.7);
    }

    #[test]
    fn refraction_bends_towards_the_normal_entering_a_gem() {
        let incoming = Vec3::new(1.0, -1.0, 0.0).normalize();
        let refracted = incoming.refract_through(Vec3::Y, 2.417).unwrap();
        assert!(refracted.x.abs() < incoming.x.abs());
        assert!((refracted.length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn total_internal_reflection_leaving_a_gem() {
        let inside = Vec3::new(0.9, 0.3, 0.0).normalize();
        assert!(inside.refract_through(Vec3::Y, 2.417).is_none());
    }

    #[test]
    fn brighter_environment_brightens_metal() {
        let lights = LightRig::default();
        let ctx = context(&lights);
        let mut dim = PbrMaterial::metal("band", MetalPreset::Platinum.descriptor());
        dim.set_environment(Some(Arc::new(EnvironmentMap::uniform(Vec3::splat(0.1)))));
        dim.compile();
        let mut bright = dim.clone();
        bright.set_environment(Some(Arc::new(EnvironmentMap::uniform(Vec3::splat(2.0)))));
        bright.compile();

        let dim_color = ctx.shade(&dim, Vec3::ZERO, Vec3::Z);
        let bright_color = ctx.shade(&bright, Vec3::ZERO, Vec3::Z);
        assert!(bright_color.element_sum() > dim_color.element_sum());
    }

    #[test]
    fn gold_reflects_warm() {
        let lights = LightRig::default();
        let ctx = context(&lights);
        let mut gold = PbrMaterial::metal("band", MetalPreset::Gold.descriptor());
        gold.set_environment(Some(Arc::new(EnvironmentMap::uniform(Vec3::ONE))));
        gold.compile();
        let color = ctx.shade(&gold, Vec3::ZERO, Vec3::Z);
        assert!(color.x > color.z);
        assert!(color.is_finite());
    }

    #[test]
    fn back_facing_normals_are_flipped() {
        let lights = LightRig::default();
        let ctx = context(&lights);
        let gem = PbrMaterial::gem("gem");
        let front = ctx.shade(&gem, Vec3::ZERO, Vec3::Z);
        let back = ctx.shade(&gem, Vec3::ZERO, -Vec3::Z);
        assert!((front - back).length() < 1e-5);
        assert!(front.is_finite() && front.element_sum() > 0.0);
    }
}
