use crate::assets::environment::EnvironmentMap;
use glam::Vec3;
use std::fmt;
use std::sync::Arc;

/// Refractive index of diamond.
pub const DIAMOND_IOR: f32 = 2.417;

/// Metalness above which an unnamed mesh still counts as a metal part.
const METALNESS_THRESHOLD: f32 = 0.5;

/// 8-bit sRGB colour as entered in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_linear(self) -> Vec3 {
        fn channel(value: u8) -> f32 {
            let c = value as f32 / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        Vec3::new(channel(self.r), channel(self.g), channel(self.b))
    }

    pub fn from_linear(color: Vec3) -> Self {
        fn channel(value: f32) -> u8 {
            let c = value.clamp(0.0, 1.0);
            let s = if c <= 0.003_130_8 {
                c * 12.92
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            };
            (s * 255.0).round() as u8
        }
        Self::new(channel(color.x), channel(color.y), channel(color.z))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("colour must start with '#': {0:?}")]
    MissingHash(String),
    #[error("colour must have exactly six hex digits: {0:?}")]
    WrongLength(String),
    #[error("colour contains a non-hex digit: {0:?}")]
    InvalidDigit(String),
}

/// Strict `#RRGGBB` parser; anything else is rejected.
pub fn parse_hex_color(input: &str) -> Result<Rgb, ColorParseError> {
    let Some(digits) = input.strip_prefix('#') else {
        return Err(ColorParseError::MissingHash(input.to_string()));
    };
    if digits.len() != 6 {
        return Err(ColorParseError::WrongLength(input.to_string()));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ColorParseError::InvalidDigit(input.to_string()));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| ColorParseError::InvalidDigit(input.to_string()))
    };
    Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MetalPreset {
    Gold,
    RoseGold,
    Platinum,
}

impl MetalPreset {
    pub const ALL: [MetalPreset; 3] = [MetalPreset::Gold, MetalPreset::RoseGold, MetalPreset::Platinum];

    pub fn label(self) -> &'static str {
        match self {
            MetalPreset::Gold => "Gold",
            MetalPreset::RoseGold => "Rose Gold",
            MetalPreset::Platinum => "Platinum",
        }
    }

    pub fn descriptor(self) -> MaterialDescriptor {
        match self {
            MetalPreset::Gold => MaterialDescriptor {
                color: Rgb::new(0xFF, 0xD7, 0x00),
                metalness: 1.0,
                roughness: 0.15,
                env_intensity: 1.5,
            },
            MetalPreset::RoseGold => MaterialDescriptor {
                color: Rgb::new(0xE8, 0xB4, 0xA0),
                metalness: 1.0,
                roughness: 0.2,
                env_intensity: 1.4,
            },
            MetalPreset::Platinum => MaterialDescriptor {
                color: Rgb::new(0xE5, 0xE4, 0xE2),
                metalness: 1.0,
                roughness: 0.1,
                env_intensity: 1.6,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialDescriptor {
    pub color: Rgb,
    pub metalness: f32,
    pub roughness: f32,
    pub env_intensity: f32,
}

impl MaterialDescriptor {
    pub fn custom(color: Rgb) -> Self {
        Self {
            color,
            metalness: 1.0,
            roughness: 0.2,
            env_intensity: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialSelection {
    Metal(MetalPreset),
    Custom(Rgb),
}

impl MaterialSelection {
    pub fn descriptor(self) -> MaterialDescriptor {
        match self {
            MaterialSelection::Metal(preset) => preset.descriptor(),
            MaterialSelection::Custom(color) => MaterialDescriptor::custom(color),
        }
    }
}

impl Default for MaterialSelection {
    fn default() -> Self {
        MaterialSelection::Metal(MetalPreset::Gold)
    }
}

/// Which mesh nodes of an external model receive a material selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MaterialPolicy {
    /// Every mesh is updated; classification only feeds logging.
    #[default]
    Uniform,
    /// Only metal-like meshes are updated; gems keep their own look.
    MetalOnly,
}

/// Metal-vs-other heuristic for meshes of externally loaded models.
pub fn is_metal_like(node_name: &str, material: Option<&PbrMaterial>) -> bool {
    let name = node_name.to_ascii_lowercase();
    if name.contains("metal") || name.contains("gold") {
        return true;
    }
    material.is_some_and(|m| m.metalness > METALNESS_THRESHOLD)
}

/// Values the rasterizer reads; rebuilt whenever the material is flagged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompiledMaterial {
    pub albedo: Vec3,
    pub env_level: f32,
    pub has_environment: bool,
}

/// Physically based material covering both metals and transmissive gems.
#[derive(Debug, Clone)]
pub struct PbrMaterial {
    pub name: String,
    pub color: Rgb,
    pub metalness: f32,
    pub roughness: f32,
    pub env_intensity: f32,
    /// 0 = opaque, 1 = fully refractive.
    pub transmission: f32,
    pub ior: f32,
    env_map: Option<Arc<EnvironmentMap>>,
    needs_update: bool,
    compiled: CompiledMaterial,
}

impl Default for PbrMaterial {
    fn default() -> Self {
        let mut material = Self {
            name: String::new(),
            color: Rgb::new(0xFF, 0xFF, 0xFF),
            metalness: 0.0,
            roughness: 1.0,
            env_intensity: 1.0,
            transmission: 0.0,
            ior: 1.5,
            env_map: None,
            needs_update: true,
            compiled: CompiledMaterial {
                albedo: Vec3::ONE,
                env_level: 0.0,
                has_environment: false,
            },
        };
        material.compile();
        material
    }
}

impl PbrMaterial {
    pub fn metal(name: &str, descriptor: MaterialDescriptor) -> Self {
        let mut material = Self {
            name: name.to_string(),
            ..Self::default()
        };
        material.apply_descriptor(descriptor);
        material
    }

    pub fn gem(name: &str) -> Self {
        Self {
            name: name.to_string(),
            color: Rgb::new(0xFF, 0xFF, 0xFF),
            metalness: 0.0,
            roughness: 0.0,
            env_intensity: 1.5,
            transmission: 1.0,
            ior: DIAMOND_IOR,
            needs_update: true,
            ..Self::default()
        }
    }

    pub fn apply_descriptor(&mut self, descriptor: MaterialDescriptor) {
        self.color = descriptor.color;
        self.metalness = descriptor.metalness;
        self.roughness = descriptor.roughness;
        self.env_intensity = descriptor.env_intensity;
        self.needs_update = true;
    }

    pub fn descriptor(&self) -> MaterialDescriptor {
        MaterialDescriptor {
            color: self.color,
            metalness: self.metalness,
            roughness: self.roughness,
            env_intensity: self.env_intensity,
        }
    }

    pub fn environment(&self) -> Option<&Arc<EnvironmentMap>> {
        self.env_map.as_ref()
    }

    pub fn set_environment(&mut self, env_map: Option<Arc<EnvironmentMap>>) {
        self.env_map = env_map;
        self.needs_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn compiled(&self) -> &CompiledMaterial {
        &self.compiled
    }

    pub fn compile(&mut self) {
        let levels = self.env_map.as_ref().map_or(1, |env| env.level_count());
        self.compiled = CompiledMaterial {
            albedo: self.color.to_linear(),
            env_level: self.roughness.clamp(0.0, 1.0) * (levels.saturating_sub(1)) as f32,
            has_environment: self.env_map.is_some(),
        };
        self.needs_update = false;
    }
}
