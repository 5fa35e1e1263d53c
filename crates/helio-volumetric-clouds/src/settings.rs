//! Cloud effect settings
//!
//! Authored once (usually from JSON), clamped to their valid ranges, then shared
//! read-only with the pass through an `Arc`.

use crate::{Error, Result};
use glam::Vec4;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the shader the feature builds its material from
pub const CLOUDS_SHADER_NAME: &str = "Hidden/Atmosphere/VolumetricClouds";

/// Smallest tiling accepted; the shader receives `1 / tiling`
pub const MIN_TILING: f32 = 1.0e-3;

/// sRGB-authored colour with straight alpha
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "one")]
    pub a: f32,
}

fn one() -> f32 {
    1.0
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Convert the colour channels from sRGB to linear. Alpha is left untouched.
    pub fn linear(self) -> Self {
        Self {
            r: srgb_to_linear(self.r),
            g: srgb_to_linear(self.g),
            b: srgb_to_linear(self.b),
            a: self.a,
        }
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else if c < 1.0 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c.powf(2.2)
    }
}

/// All authored parameters of the cloud effect
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumetricCloudsSettings {
    // Bounds
    /// Scene object whose transform bounds the cloud layer
    pub clouds_box_object_name: String,

    // Textures (resolved by name through the backend)
    pub clouds_fbm_texture: Option<String>,
    pub clouds_detail_noise_texture: Option<String>,
    pub weather_map: Option<String>,
    pub mask_noise_texture: Option<String>,

    // Sun
    pub sun_light_color: Color,
    pub sun_light_intensity: f32,

    // Shape
    pub clouds_shape_tiling: f32,
    pub clouds_fbm_weights: Vec4,
    /// [0, 1]
    pub height_weight: f32,
    /// [0, 3]
    pub noise_strength: f32,
    /// [0.01, 1]
    pub edge_fade_proportion: f32,

    // Detail
    pub clouds_detail_tiling: f32,
    pub detail_weight: f32,
    pub detail_noise_weight: f32,
    /// [0, 1]
    pub detail_noise_strength: f32,

    /// xyz: wind direction scaled by speed, w: detail speed
    pub speed_params: Vec4,

    // Lighting
    pub color_a: Color,
    pub color_b: Color,
    pub light_absorption_toward_sun: f32,
    pub light_absorption_through_clouds: f32,
    pub color_offset1: f32,
    pub color_offset2: f32,
    pub darkness_threshold: f32,

    // Marching
    pub step_count: u32,
    pub step_stride: f32,
    pub light_step_count: u32,

    // Density
    /// [-3, 3]
    pub density_offset: f32,
    pub density_multiplier: f32,

    // Phase
    pub albedo: Color,
    pub forward_phase_g: f32,
    pub back_phase_g: f32,
    pub phase_blend: f32,
}

impl Default for VolumetricCloudsSettings {
    fn default() -> Self {
        Self {
            clouds_box_object_name: "CloudsBox".to_string(),
            clouds_fbm_texture: None,
            clouds_detail_noise_texture: None,
            weather_map: None,
            mask_noise_texture: None,
            sun_light_color: Color::WHITE,
            sun_light_intensity: 1.0,
            clouds_shape_tiling: 100.0,
            clouds_fbm_weights: Vec4::ZERO,
            height_weight: 0.5,
            noise_strength: 0.1,
            edge_fade_proportion: 0.1,
            clouds_detail_tiling: 100.0,
            detail_weight: 1.0,
            detail_noise_weight: 1.0,
            detail_noise_strength: 0.1,
            speed_params: Vec4::ZERO,
            color_a: Color::WHITE,
            color_b: Color::WHITE,
            light_absorption_toward_sun: 0.1,
            light_absorption_through_clouds: 0.25,
            color_offset1: 0.86,
            color_offset2: 0.82,
            darkness_threshold: 0.6,
            step_count: 32,
            step_stride: 0.5,
            light_step_count: 8,
            density_offset: 0.0,
            density_multiplier: 5.0,
            albedo: Color::WHITE,
            forward_phase_g: 0.8,
            back_phase_g: 0.3,
            phase_blend: 0.5,
        }
    }
}

impl VolumetricCloudsSettings {
    /// Parse settings from JSON. Missing fields take their defaults and the
    /// result is clamped.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        Ok(settings.clamped())
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&json)
            .map_err(|e| Error::Settings(format!("{}: {}", path.display(), e)))?;
        log::debug!("Loaded cloud settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamp every ranged field into its valid interval
    pub fn clamped(mut self) -> Self {
        // NaN lands on the lower bound, except the density offset which becomes neutral
        let range = |v: f32, min: f32, max: f32| if v.is_nan() { min } else { v.clamp(min, max) };
        let unit = |v: f32| range(v, 0.0, 1.0);

        self.height_weight = unit(self.height_weight);
        self.noise_strength = range(self.noise_strength, 0.0, 3.0);
        self.edge_fade_proportion = range(self.edge_fade_proportion, 0.01, 1.0);
        self.detail_noise_strength = unit(self.detail_noise_strength);

        self.light_absorption_toward_sun = unit(self.light_absorption_toward_sun);
        self.light_absorption_through_clouds = unit(self.light_absorption_through_clouds);
        self.color_offset1 = unit(self.color_offset1);
        self.color_offset2 = unit(self.color_offset2);
        self.darkness_threshold = unit(self.darkness_threshold);

        self.forward_phase_g = unit(self.forward_phase_g);
        self.back_phase_g = unit(self.back_phase_g);
        self.phase_blend = unit(self.phase_blend);

        self.density_offset = if self.density_offset.is_nan() {
            0.0
        } else {
            self.density_offset.clamp(-3.0, 3.0)
        };

        self.step_count = self.step_count.max(1);
        self.light_step_count = self.light_step_count.max(1);

        self.clouds_shape_tiling = self.clouds_shape_tiling.max(MIN_TILING);
        self.clouds_detail_tiling = self.clouds_detail_tiling.max(MIN_TILING);

        self
    }

    pub fn with_clouds_box(mut self, name: impl Into<String>) -> Self {
        self.clouds_box_object_name = name.into();
        self
    }

    pub fn with_step_count(mut self, steps: u32) -> Self {
        self.step_count = steps.max(1);
        self
    }

    pub fn with_density(mut self, offset: f32, multiplier: f32) -> Self {
        self.density_offset = offset.clamp(-3.0, 3.0);
        self.density_multiplier = multiplier;
        self
    }

    pub fn with_phase(mut self, forward_g: f32, back_g: f32, blend: f32) -> Self {
        self.forward_phase_g = forward_g.clamp(0.0, 1.0);
        self.back_phase_g = back_g.clamp(0.0, 1.0);
        self.phase_blend = blend.clamp(0.0, 1.0);
        self
    }
}
