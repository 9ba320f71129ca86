//! Software triangle rasterization into an HDR colour buffer.

use glam::{Vec3, Vec4};

/// Clip-space w below this is treated as behind the eye.
const NEAR_W: f32 = 1e-3;

/// One transformed vertex ready for rasterization.
#[derive(Debug, Clone, Copy)]
pub struct ClipVertex {
    pub clip: Vec4,
    pub world: Vec3,
    pub normal: Vec3,
}

/// Linear HDR colour plus depth, one entry per pixel.
pub struct Framebuffer {
    pub color: Vec<Vec3>,
    pub depth: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            color: vec![Vec3::ZERO; width * height],
            depth: vec![f32::MAX; width * height],
            width,
            height,
        }
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.color = vec![Vec3::ZERO; width * height];
            self.depth = vec![f32::MAX; width * height];
        }
    }

    /// Vertical gradient, `top` at row 0; also resets depth.
    pub fn clear_gradient(&mut self, top: Vec3, bottom: Vec3) {
        let h = self.height;
        for y in 0..h {
            let t = if h > 1 { y as f32 / (h - 1) as f32 } else { 0.0 };
            let color = top.lerp(bottom, t);
            let row = y * self.width..(y + 1) * self.width;
            self.color[row.clone()].fill(color);
            self.depth[row].fill(f32::MAX);
        }
    }

    /// Rasterizes an indexed triangle list; `shade` gets the interpolated
    /// world position and normal of every fragment that passes the depth test.
    pub fn draw_triangles<F>(&mut self, vertices: &[ClipVertex], indices: &[u32], mut shade: F) -> usize
    where
        F: FnMut(Vec3, Vec3) -> Vec3,
    {
        let mut drawn = 0;
        for triangle in indices.chunks_exact(3) {
            let fetch = |i: u32| vertices.get(i as usize).copied();
            let (Some(a), Some(b), Some(c)) = (fetch(triangle[0]), fetch(triangle[1]), fetch(triangle[2]))
            else {
                continue;
            };
            if self.rasterize(&[a, b, c], &mut shade) {
                drawn += 1;
            }
        }
        drawn
    }

    fn to_screen(&self, clip: Vec4) -> Vec3 {
        let ndc = clip.truncate() / clip.w;
        Vec3::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (0.5 - ndc.y * 0.5) * self.height as f32,
            ndc.z,
        )
    }

    fn rasterize<F>(&mut self, tri: &[ClipVertex; 3], shade: &mut F) -> bool
    where
        F: FnMut(Vec3, Vec3) -> Vec3,
    {
        // No clipping; a triangle crossing the near plane is skipped whole.
        if tri.iter().any(|v| v.clip.w <= NEAR_W) {
            return false;
        }
        let v1 = self.to_screen(tri[0].clip);
        let v2 = self.to_screen(tri[1].clip);
        let v3 = self.to_screen(tri[2].clip);

        let min_x = v1.x.min(v2.x).min(v3.x).max(0.0) as usize;
        let max_x = (v1.x.max(v2.x).max(v3.x) + 1.0).min(self.width as f32).max(0.0) as usize;
        let min_y = v1.y.min(v2.y).min(v3.y).max(0.0) as usize;
        let max_y = (v1.y.max(v2.y).max(v3.y) + 1.0).min(self.height as f32).max(0.0) as usize;
        if min_x >= max_x || min_y >= max_y {
            return false;
        }

        // Signed area; either winding is accepted so meshes render double-sided.
        let area = (v2.y - v3.y) * (v1.x - v3.x) + (v3.x - v2.x) * (v1.y - v3.y);
        if area.abs() < 1e-8 {
            return false;
        }
        let inv_area = 1.0 / area;

        // Edge function steps: `a` per pixel along x, `b` per row along y.
        let a0 = v2.y - v3.y;
        let b0 = v3.x - v2.x;
        let a1 = v3.y - v1.y;
        let b1 = v1.x - v3.x;

        // Sample at pixel centres.
        let start_x = min_x as f32 + 0.5;
        let start_y = min_y as f32 + 0.5;
        let mut w0_row = a0 * (start_x - v3.x) + b0 * (start_y - v3.y);
        let mut w1_row = a1 * (start_x - v3.x) + b1 * (start_y - v3.y);

        let inv_w = [1.0 / tri[0].clip.w, 1.0 / tri[1].clip.w, 1.0 / tri[2].clip.w];
        let mut covered = false;

        for y in min_y..max_y {
            let mut w0 = w0_row;
            let mut w1 = w1_row;
            for x in min_x..max_x {
                let bc_x = w0 * inv_area;
                let bc_y = w1 * inv_area;
                let bc_z = 1.0 - bc_x - bc_y;
                w0 += a0;
                w1 += a1;

                // Small negative slack closes hairline gaps on shared edges.
                const ERR: f32 = -1e-4;
                if bc_x < ERR || bc_y < ERR || bc_z < ERR {
                    continue;
                }
                // NDC depth is affine in screen space.
                let z = bc_x * v1.z + bc_y * v2.z + bc_z * v3.z;
                let idx = y * self.width + x;
                if !(0.0..=1.0).contains(&z) || z >= self.depth[idx] {
                    continue;
                }

                // Attributes need perspective correction: weight by 1/w, then renormalize.
                let pw = [bc_x * inv_w[0], bc_y * inv_w[1], bc_z * inv_w[2]];
                let norm = 1.0 / (pw[0] + pw[1] + pw[2]);
                let world = (tri[0].world * pw[0] + tri[1].world * pw[1] + tri[2].world * pw[2]) * norm;
                let normal = (tri[0].normal * pw[0] + tri[1].normal * pw[1] + tri[2].normal * pw[2]) * norm;

                self.depth[idx] = z;
                self.color[idx] = shade(world, normal.normalize_or_zero());
                covered = true;
            }
            w0_row += b0;
            w1_row += b1;
        }
        covered
    }
}

/// ACES filmic curve (Narkowicz fit).
pub fn aces_tonemap(color: Vec3) -> Vec3 {
    const A: f32 = 2.51;
    const B: f32 = 0.03;
    const C: f32 = 2.43;
    const D: f32 = 0.59;
    const E: f32 = 0.14;
    ((color * (color * A + B)) / (color * (color * C + D) + E)).clamp(Vec3::ZERO, Vec3::ONE)
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Tone maps and encodes `color` into opaque RGBA8 rows.
pub fn encode_rgba8(color: &[Vec3], exposure: f32, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(color.len() * 4);
    for texel in color {
        let mapped = aces_tonemap(texel.max(Vec3::ZERO) * exposure);
        out.push((linear_to_srgb(mapped.x) * 255.0 + 0.5) as u8);
        out.push((linear_to_srgb(mapped.y) * 255.0 + 0.5) as u8);
        out.push((linear_to_srgb(mapped.z) * 255.0 + 0.5) as u8);
        out.push(255);
    }
}
