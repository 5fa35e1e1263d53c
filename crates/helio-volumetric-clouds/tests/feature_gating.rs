mod common;

use common::Host;
use glam::Vec3;
use helio_volumetric_clouds::backend::software::SoftwareBackend;
use helio_volumetric_clouds::settings::CLOUDS_SHADER_NAME;
use helio_volumetric_clouds::{RendererFeature, VolumetricCloudsFeature, VolumetricCloudsSettings};

fn feature() -> VolumetricCloudsFeature<SoftwareBackend> {
    let mut feature = VolumetricCloudsFeature::new(VolumetricCloudsSettings::default());
    feature.create();
    feature
}

#[test]
fn post_processing_disabled_skips_without_touching_resources() {
    let mut host = Host::new(SoftwareBackend::new(), 16, 16);
    host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::new(20.0, 10.0, 20.0));
    host.post_processing = false;
    let mut feature = feature();

    assert_eq!(host.render(&mut feature), (0, 0));
    assert_eq!(host.backend.stats().materials_created(), 0);
    assert_eq!(host.backend.stats().targets_allocated(), 0);
    assert_eq!(host.backend.stats().blits(), 0);
}

#[test]
fn missing_shader_skips_and_recovers_once_available() {
    let mut host = Host::new(SoftwareBackend::without_shaders(), 16, 16);
    host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::new(20.0, 10.0, 20.0));
    let mut feature = feature();

    assert_eq!(host.render(&mut feature), (0, 0));
    assert_eq!(host.render(&mut feature), (0, 0));
    assert!(feature.material().is_none());
    assert_eq!(host.backend.stats().targets_allocated(), 0);

    host.backend.register_shader(CLOUDS_SHADER_NAME);
    assert_eq!(host.render(&mut feature), (1, 1));
    assert_eq!(host.backend.stats().materials_created(), 1);
}

#[test]
fn missing_bounds_skips_and_recovers_once_spawned() {
    let mut host = Host::new(SoftwareBackend::new(), 16, 16);
    let mut feature = feature();

    assert_eq!(host.render(&mut feature), (0, 0));
    assert!(!feature.has_clouds_box());
    assert_eq!(host.backend.stats().targets_allocated(), 0);
    assert_eq!(host.backend.stats().blits(), 0);

    host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::new(20.0, 10.0, 20.0));
    assert_eq!(host.render(&mut feature), (1, 1));
    assert_eq!(host.backend.stats().targets_allocated(), 1);
}

#[test]
fn box_is_looked_up_by_configured_name() {
    let mut host = Host::new(SoftwareBackend::new(), 16, 16);
    host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::ONE);
    let mut feature = VolumetricCloudsFeature::<SoftwareBackend>::new(
        VolumetricCloudsSettings::default().with_clouds_box("StormLayer"),
    );
    feature.create();

    assert_eq!(host.render(&mut feature), (0, 0));

    host.scene.spawn("StormLayer", Vec3::ZERO, Vec3::ONE);
    assert_eq!(host.render(&mut feature), (1, 1));
}

#[test]
fn disabled_feature_is_skipped_by_the_registry() {
    use helio_volumetric_clouds::{FeatureRegistry, FrameContext, PassQueue};

    let host = Host::new(SoftwareBackend::new(), 16, 16);
    let mut registry = FeatureRegistry::<SoftwareBackend>::new();
    registry
        .register(VolumetricCloudsFeature::new(VolumetricCloudsSettings::default()))
        .unwrap();
    registry.create_all();
    registry.disable(VolumetricCloudsFeature::<SoftwareBackend>::NAME).unwrap();

    let frame: FrameContext<'_, SoftwareBackend> = host.frame_context();
    let mut queue = PassQueue::new();
    registry.add_render_passes(&mut queue, &frame);
    assert!(queue.is_empty());
    assert_eq!(host.backend.stats().materials_created(), 0);
}
