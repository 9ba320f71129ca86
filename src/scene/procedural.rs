//! Built-in ring: a torus band with a diamond set on top.

use super::material::{MaterialDescriptor, PbrMaterial};
use super::{Mesh, MeshNode, Model, ModelKind};
use glam::{Mat4, Vec3};
use std::f32::consts::TAU;

pub const BAND_RADIUS: f32 = 1.0;
pub const BAND_TUBE: f32 = 0.08;
pub const BAND_RADIAL_SEGMENTS: u32 = 32;
pub const BAND_TUBULAR_SEGMENTS: u32 = 128;
pub const GEM_RADIUS: f32 = 0.22;

/// Material slot of the band; the procedural model has exactly one metal material.
pub const BAND_MATERIAL: usize = 0;
pub const GEM_MATERIAL: usize = 1;

pub fn build_ring(band: MaterialDescriptor) -> Model {
    let band_node = MeshNode {
        name: "band_metal".to_string(),
        mesh: torus(BAND_RADIUS, BAND_TUBE, BAND_RADIAL_SEGMENTS, BAND_TUBULAR_SEGMENTS),
        world: Mat4::IDENTITY,
        material: BAND_MATERIAL,
    };
    // Seated on top of the band, slightly sunk into the tube.
    let gem_offset = Vec3::new(0.0, BAND_RADIUS + BAND_TUBE + GEM_RADIUS * 0.9, 0.0);
    let gem_node = MeshNode {
        name: "gem".to_string(),
        mesh: octahedron(GEM_RADIUS),
        world: Mat4::from_translation(gem_offset) * Mat4::from_scale(Vec3::new(1.0, 1.2, 1.0)),
        material: GEM_MATERIAL,
    };
    Model::new(
        ModelKind::Procedural,
        vec![band_node, gem_node],
        vec![PbrMaterial::metal("band", band), PbrMaterial::gem("diamond")],
    )
}

/// Torus in the XY plane, laid out row by row with a duplicated seam.
pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> Mesh {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for j in 0..=radial_segments {
        let v = j as f32 / radial_segments as f32 * TAU;
        for i in 0..=tubular_segments {
            let u = i as f32 / tubular_segments as f32 * TAU;
            let position = Vec3::new(
                (radius + tube * v.cos()) * u.cos(),
                (radius + tube * v.cos()) * u.sin(),
                tube * v.sin(),
            );
            let centre = Vec3::new(radius * u.cos(), radius * u.sin(), 0.0);
            positions.push(position);
            normals.push((position - centre).normalize_or_zero());
        }
    }

    let row = tubular_segments + 1;
    let mut indices = Vec::with_capacity((radial_segments * tubular_segments * 6) as usize);
    for j in 1..=radial_segments {
        for i in 1..=tubular_segments {
            // Two triangles per quad of the (j, i) grid.
            let a = row * j + i - 1;
            let b = row * (j - 1) + i - 1;
            let c = row * (j - 1) + i;
            let d = row * j + i;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    Mesh {
        positions,
        normals,
        indices,
    }
}

/// Flat-shaded octahedron (one vertex triple per face).
pub fn octahedron(radius: f32) -> Mesh {
    let px = Vec3::X * radius;
    let nx = -Vec3::X * radius;
    let py = Vec3::Y * radius;
    let ny = -Vec3::Y * radius;
    let pz = Vec3::Z * radius;
    let nz = -Vec3::Z * radius;
    let faces = [
        [px, py, pz],
        [pz, py, nx],
        [nx, py, nz],
        [nz, py, px],
        [px, pz, ny],
        [pz, nx, ny],
        [nx, nz, ny],
        [nz, px, ny],
    ];

    let mut mesh = Mesh::default();
    for face in faces {
        let normal = (face[1] - face[0]).cross(face[2] - face[0]).normalize_or_zero();
        for corner in face {
            mesh.indices.push(mesh.positions.len() as u32);
            mesh.positions.push(corner);
            mesh.normals.push(normal);
        }
    }
    mesh
}
