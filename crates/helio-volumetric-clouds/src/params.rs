//! Shader parameter table
//!
//! Every value the cloud shader reads is declared once in [`shader_params!`]:
//! semantic name, shader property name, value kind and which stage of the frame
//! produces it. Uploads go through [`ShaderParam`] slots instead of scattered
//! string constants, and backends store values in a [`ParameterBlock`] which packs
//! into the std140 [`CloudUniforms`] block.

use crate::backend::Material;
use crate::bounds::CloudBounds;
use crate::camera::CameraRays;
use crate::settings::{Color, VolumetricCloudsSettings};
use glam::{Vec3, Vec4};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Kind of value a parameter slot holds
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Float,
    Vector,
    /// Colour subject to the backend's working colour space
    Color,
    Texture,
}

/// Which part of the frame setup writes a parameter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamGroup {
    /// Camera-ray basis
    Camera,
    /// Camera-relative cloud box
    Bounds,
    /// Authored settings
    Settings,
    /// Per-frame host globals
    Frame,
}

macro_rules! shader_params {
    ($($variant:ident => $name:literal, $kind:ident, $group:ident;)*) => {
        /// A named slot in the cloud material
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ShaderParam {
            $($variant,)*
        }

        impl ShaderParam {
            /// Every parameter, in slot order
            pub const ALL: &'static [ShaderParam] = &[$(ShaderParam::$variant,)*];
            pub const COUNT: usize = Self::ALL.len();

            /// Shader property name
            pub fn name(self) -> &'static str {
                match self {
                    $(ShaderParam::$variant => $name,)*
                }
            }

            pub fn kind(self) -> ParamKind {
                match self {
                    $(ShaderParam::$variant => ParamKind::$kind,)*
                }
            }

            pub fn group(self) -> ParamGroup {
                match self {
                    $(ShaderParam::$variant => ParamGroup::$group,)*
                }
            }
        }
    };
}

shader_params! {
    CameraViewTopLeftCorner => "_CameraViewTopLeftCorner", Vector, Camera;
    CameraViewXExtent => "_CameraViewXExtent", Vector, Camera;
    CameraViewYExtent => "_CameraViewYExtent", Vector, Camera;
    ProjectionParams2 => "_ProjectionParams2", Vector, Camera;

    CloudsBoundsMin => "_CloudsBoundsMin", Vector, Bounds;
    CloudsBoundsMax => "_CloudsBoundsMax", Vector, Bounds;

    CloudsFbmTexture => "_CloudsFBMTexture", Texture, Settings;
    CloudsDetailNoiseTexture => "_CloudsDetailNoiseTexture", Texture, Settings;
    WeatherTexture => "_WeatherTexture", Texture, Settings;
    MaskNoiseTexture => "_MaskNoiseTexture", Texture, Settings;

    CloudsShapeParams => "_CloudsShapeParams", Vector, Settings;
    CloudsShapeParams2 => "_CloudsShapeParams2", Vector, Settings;
    CloudsFbmWeights => "_CloudsFBMWeights", Vector, Settings;

    SpeedParams => "_SpeedParams", Vector, Settings;

    ColorA => "_ColorA", Vector, Settings;
    ColorB => "_ColorB", Vector, Settings;
    ColorOffsets => "_ColorOffsets", Vector, Settings;
    LightAbsorptionTowardSun => "_LightAbsorptionTowardSun", Float, Settings;
    LightAbsorptionThroughClouds => "_LightAbsorptionThroughClouds", Float, Settings;
    DarknessThreshold => "_DarknessThreshold", Float, Settings;

    StepParams => "_StepParams", Vector, Settings;
    DensityParams => "_DensityParams", Vector, Settings;

    SunLightColor => "_SunLightColor", Color, Settings;
    SunLightIntensity => "_SunLightIntensity", Float, Settings;

    Albedo => "_Albedo", Color, Settings;
    PhaseParams => "_PhaseParams", Vector, Settings;

    Time => "_Time", Vector, Frame;
    MainLightDirection => "_MainLightDirection", Vector, Frame;
}

impl ShaderParam {
    /// Slot index inside a [`ParameterBlock`]
    pub fn slot(self) -> usize {
        self as usize
    }

    /// Look a parameter up by its shader property name
    pub fn from_name(name: &str) -> Option<ShaderParam> {
        static TABLE: OnceLock<HashMap<&'static str, ShaderParam>> = OnceLock::new();
        TABLE
            .get_or_init(|| ShaderParam::ALL.iter().map(|&p| (p.name(), p)).collect())
            .get(name)
            .copied()
    }
}

/// A value bound to a parameter slot
#[derive(Clone, Debug, PartialEq)]
pub enum ShaderValue {
    Float(f32),
    Vector(Vec4),
    Color(Color),
    /// Texture name, resolved by the backend; `None` binds the fallback texture
    Texture(Option<String>),
}

impl ShaderValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ShaderValue::Float(_) => ParamKind::Float,
            ShaderValue::Vector(_) => ParamKind::Vector,
            ShaderValue::Color(_) => ParamKind::Color,
            ShaderValue::Texture(_) => ParamKind::Texture,
        }
    }
}

/// Colour space colours are authored in vs. the space shaders compute in
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ColorSpace {
    Gamma,
    #[default]
    Linear,
}

impl ColorSpace {
    /// Convert an authored colour the way `Material::set_color` does
    pub fn convert(self, color: Color) -> Color {
        match self {
            ColorSpace::Gamma => color,
            ColorSpace::Linear => color.linear(),
        }
    }
}

/// Storage for every slot of the cloud material
#[derive(Clone, Debug)]
pub struct ParameterBlock {
    values: [Option<ShaderValue>; ShaderParam::COUNT],
}

impl Default for ParameterBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterBlock {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| None),
        }
    }

    /// Store a value. A value whose kind does not match the slot is dropped.
    pub fn set(&mut self, param: ShaderParam, value: ShaderValue) {
        if value.kind() != param.kind() {
            log::warn!(
                "Ignoring {:?} value for {} (expects {:?})",
                value.kind(),
                param.name(),
                param.kind()
            );
            return;
        }
        self.values[param.slot()] = Some(value);
    }

    pub fn get(&self, param: ShaderParam) -> Option<&ShaderValue> {
        self.values[param.slot()].as_ref()
    }

    pub fn float(&self, param: ShaderParam) -> f32 {
        match self.get(param) {
            Some(ShaderValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn vector(&self, param: ShaderParam) -> Vec4 {
        match self.get(param) {
            Some(ShaderValue::Vector(v)) => *v,
            _ => Vec4::ZERO,
        }
    }

    /// Colour in the given working colour space
    pub fn color(&self, param: ShaderParam, space: ColorSpace) -> Vec4 {
        match self.get(param) {
            Some(ShaderValue::Color(c)) => space.convert(*c).to_vec4(),
            _ => Vec4::ZERO,
        }
    }

    pub fn texture(&self, param: ShaderParam) -> Option<&str> {
        match self.get(param) {
            Some(ShaderValue::Texture(name)) => name.as_deref(),
            _ => None,
        }
    }

    /// Parameters that have never been written
    pub fn missing(&self) -> Vec<ShaderParam> {
        ShaderParam::ALL
            .iter()
            .copied()
            .filter(|p| self.values[p.slot()].is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// Uniform block consumed by the cloud shader. Must match `CloudUniforms` in
/// `shaders/passes/volumetric_clouds.wgsl`
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CloudUniforms {
    pub camera_view_top_left_corner: [f32; 4],
    pub camera_view_x_extent: [f32; 4],
    pub camera_view_y_extent: [f32; 4],
    /// x: 1 / near, yzw: camera position
    pub projection_params2: [f32; 4],
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    /// x: 1 / shape tiling, y: height weight, z: noise strength, w: edge fade
    pub shape_params: [f32; 4],
    /// x: 1 / detail tiling, y: detail weight, z: detail noise weight, w: detail noise strength
    pub shape_params2: [f32; 4],
    pub fbm_weights: [f32; 4],
    pub speed_params: [f32; 4],
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
    /// x: offset 1, y: offset 2
    pub color_offsets: [f32; 4],
    /// x: step count, y: stride, z: light step count
    pub step_params: [f32; 4],
    /// x: offset, y: multiplier
    pub density_params: [f32; 4],
    pub sun_light_color: [f32; 4],
    pub albedo: [f32; 4],
    /// x: forward g, y: back g, z: blend
    pub phase_params: [f32; 4],
    /// xyz: direction towards the main light
    pub main_light_direction: [f32; 4],
    /// x: seconds
    pub time: [f32; 4],
    /// x: absorption toward sun, y: absorption through clouds, z: darkness threshold, w: sun intensity
    pub lighting: [f32; 4],
}

impl CloudUniforms {
    pub fn from_block(block: &ParameterBlock, space: ColorSpace) -> Self {
        use ShaderParam as P;
        let v = |p: ShaderParam| block.vector(p).to_array();
        let c = |p: ShaderParam| block.color(p, space).to_array();

        Self {
            camera_view_top_left_corner: v(P::CameraViewTopLeftCorner),
            camera_view_x_extent: v(P::CameraViewXExtent),
            camera_view_y_extent: v(P::CameraViewYExtent),
            projection_params2: v(P::ProjectionParams2),
            bounds_min: v(P::CloudsBoundsMin),
            bounds_max: v(P::CloudsBoundsMax),
            shape_params: v(P::CloudsShapeParams),
            shape_params2: v(P::CloudsShapeParams2),
            fbm_weights: v(P::CloudsFbmWeights),
            speed_params: v(P::SpeedParams),
            color_a: v(P::ColorA),
            color_b: v(P::ColorB),
            color_offsets: v(P::ColorOffsets),
            step_params: v(P::StepParams),
            density_params: v(P::DensityParams),
            sun_light_color: c(P::SunLightColor),
            albedo: c(P::Albedo),
            phase_params: v(P::PhaseParams),
            main_light_direction: v(P::MainLightDirection),
            time: v(P::Time),
            lighting: [
                block.float(P::LightAbsorptionTowardSun),
                block.float(P::LightAbsorptionThroughClouds),
                block.float(P::DarknessThreshold),
                block.float(P::SunLightIntensity),
            ],
        }
    }
}

/// Upload the view-ray basis
pub fn upload_camera_rays<M: Material + ?Sized>(material: &M, rays: &CameraRays) {
    material.set_vector(ShaderParam::CameraViewTopLeftCorner, rays.top_left.extend(0.0));
    material.set_vector(ShaderParam::CameraViewXExtent, rays.x_extent.extend(0.0));
    material.set_vector(ShaderParam::CameraViewYExtent, rays.y_extent.extend(0.0));
    material.set_vector(ShaderParam::ProjectionParams2, rays.projection_params);
}

/// Upload the camera-relative cloud box
pub fn upload_bounds<M: Material + ?Sized>(material: &M, bounds: &CloudBounds) {
    material.set_vector(ShaderParam::CloudsBoundsMin, bounds.min.extend(0.0));
    material.set_vector(ShaderParam::CloudsBoundsMax, bounds.max.extend(0.0));
}

/// Per-frame host globals
pub fn upload_frame_globals<M: Material + ?Sized>(material: &M, time: f32, main_light_direction: Vec3) {
    material.set_vector(ShaderParam::Time, Vec4::new(time, 0.0, 0.0, 0.0));
    material.set_vector(
        ShaderParam::MainLightDirection,
        main_light_direction.normalize_or_zero().extend(0.0),
    );
}

/// Every authored setting as the slot/value pairs the shader expects
///
/// Related scalars are packed the way the shader groups them. The two gradient
/// colours are converted to linear here, independent of the working colour
/// space; the sun colour and albedo go through the backend's colour conversion.
pub fn settings_values(s: &VolumetricCloudsSettings) -> Vec<(ShaderParam, ShaderValue)> {
    use ShaderParam as P;
    use ShaderValue::{Color as C, Float as F, Texture as T, Vector as V};

    vec![
        (P::CloudsFbmTexture, T(s.clouds_fbm_texture.clone())),
        (P::CloudsDetailNoiseTexture, T(s.clouds_detail_noise_texture.clone())),
        (P::WeatherTexture, T(s.weather_map.clone())),
        (P::MaskNoiseTexture, T(s.mask_noise_texture.clone())),
        (
            P::CloudsShapeParams,
            V(Vec4::new(
                1.0 / s.clouds_shape_tiling,
                s.height_weight,
                s.noise_strength,
                s.edge_fade_proportion,
            )),
        ),
        (
            P::CloudsShapeParams2,
            V(Vec4::new(
                1.0 / s.clouds_detail_tiling,
                s.detail_weight,
                s.detail_noise_weight,
                s.detail_noise_strength,
            )),
        ),
        (P::CloudsFbmWeights, V(s.clouds_fbm_weights)),
        (P::SpeedParams, V(s.speed_params)),
        (P::ColorA, V(s.color_a.linear().to_vec4())),
        (P::ColorB, V(s.color_b.linear().to_vec4())),
        (P::LightAbsorptionTowardSun, F(s.light_absorption_toward_sun)),
        (P::LightAbsorptionThroughClouds, F(s.light_absorption_through_clouds)),
        (P::ColorOffsets, V(Vec4::new(s.color_offset1, s.color_offset2, 0.0, 0.0))),
        (P::DarknessThreshold, F(s.darkness_threshold)),
        (
            P::StepParams,
            V(Vec4::new(s.step_count as f32, s.step_stride, s.light_step_count as f32, 0.0)),
        ),
        (P::DensityParams, V(Vec4::new(s.density_offset, s.density_multiplier, 0.0, 0.0))),
        (P::SunLightColor, C(s.sun_light_color)),
        (P::SunLightIntensity, F(s.sun_light_intensity)),
        (P::Albedo, C(s.albedo)),
        (
            P::PhaseParams,
            V(Vec4::new(s.forward_phase_g, s.back_phase_g, s.phase_blend, 0.0)),
        ),
    ]
}

/// Upload every authored setting
pub fn upload_settings<M: Material + ?Sized>(material: &M, settings: &VolumetricCloudsSettings) {
    for (param, value) in settings_values(settings) {
        material.set(param, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_resolvable() {
        let names: HashSet<_> = ShaderParam::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), ShaderParam::COUNT);
        for &p in ShaderParam::ALL {
            assert_eq!(ShaderParam::from_name(p.name()), Some(p));
            assert_eq!(ShaderParam::ALL[p.slot()], p);
        }
        assert_eq!(ShaderParam::from_name("_MainTex"), None);
    }

    #[test]
    fn settings_values_cover_exactly_the_settings_group() {
        let produced: HashSet<_> = settings_values(&VolumetricCloudsSettings::default())
            .into_iter()
            .map(|(p, v)| {
                assert_eq!(v.kind(), p.kind(), "{} has the wrong kind", p.name());
                p
            })
            .collect();
        let expected: HashSet<_> = ShaderParam::ALL
            .iter()
            .copied()
            .filter(|p| p.group() == ParamGroup::Settings)
            .collect();
        assert_eq!(produced, expected);
    }

    #[test]
    fn packing_follows_shader_grouping() {
        let settings = VolumetricCloudsSettings {
            clouds_shape_tiling: 50.0,
            clouds_detail_tiling: 25.0,
            step_count: 16,
            step_stride: 0.25,
            light_step_count: 4,
            ..Default::default()
        };
        let mut block = ParameterBlock::new();
        for (p, v) in settings_values(&settings) {
            block.set(p, v);
        }

        assert_eq!(block.vector(ShaderParam::CloudsShapeParams), Vec4::new(0.02, 0.5, 0.1, 0.1));
        assert_eq!(block.vector(ShaderParam::CloudsShapeParams2).x, 0.04);
        assert_eq!(block.vector(ShaderParam::StepParams), Vec4::new(16.0, 0.25, 4.0, 0.0));
        assert_eq!(block.vector(ShaderParam::PhaseParams), Vec4::new(0.8, 0.3, 0.5, 0.0));
        assert_eq!(block.vector(ShaderParam::ColorOffsets), Vec4::new(0.86, 0.82, 0.0, 0.0));
    }

    #[test]
    fn gradient_colors_are_linear_regardless_of_color_space() {
        let settings = VolumetricCloudsSettings {
            color_a: Color::rgb(0.5, 0.5, 0.5),
            sun_light_color: Color::rgb(0.5, 0.5, 0.5),
            ..Default::default()
        };
        let mut block = ParameterBlock::new();
        for (p, v) in settings_values(&settings) {
            block.set(p, v);
        }

        let linear_half = Color::rgb(0.5, 0.5, 0.5).linear().r;
        for space in [ColorSpace::Gamma, ColorSpace::Linear] {
            let uniforms = CloudUniforms::from_block(&block, space);
            assert_eq!(uniforms.color_a[0], linear_half);
        }
        assert_eq!(CloudUniforms::from_block(&block, ColorSpace::Gamma).sun_light_color[0], 0.5);
        assert_eq!(CloudUniforms::from_block(&block, ColorSpace::Linear).sun_light_color[0], linear_half);
    }

    #[test]
    fn mismatched_kind_is_ignored() {
        let mut block = ParameterBlock::new();
        block.set(ShaderParam::StepParams, ShaderValue::Float(3.0));
        assert!(block.get(ShaderParam::StepParams).is_none());
        assert!(block.missing().contains(&ShaderParam::StepParams));
    }

    #[test]
    fn uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<CloudUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<CloudUniforms>(), 21 * 16);
    }
}
