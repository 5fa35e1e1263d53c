mod common;

use common::Host;
use glam::{Vec3, Vec4};
use helio_volumetric_clouds::backend::software::SoftwareBackend;
use helio_volumetric_clouds::backend::RenderTarget;
use helio_volumetric_clouds::params::ShaderParam;
use helio_volumetric_clouds::{
    Error, FeatureRegistry, RendererFeature, SceneLookup, VolumetricCloudsFeature, VolumetricCloudsSettings,
};

fn ready_host(width: u32, height: u32) -> Host {
    let mut host = Host::new(SoftwareBackend::new(), width, height);
    host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::new(20.0, 10.0, 20.0));
    host
}

fn feature() -> VolumetricCloudsFeature<SoftwareBackend> {
    let mut feature = VolumetricCloudsFeature::new(VolumetricCloudsSettings::default());
    feature.create();
    feature
}

fn scratch_id(feature: &VolumetricCloudsFeature<SoftwareBackend>) -> Option<u64> {
    let pass = feature.pass()?.lock();
    let id = pass.scratch().get().map(|t| t.id());
    id
}

#[test]
fn bounds_resolution_is_one_shot() {
    let mut host = ready_host(16, 16);
    let mut feature = feature();
    assert_eq!(host.render(&mut feature), (1, 1));

    // The scene loses the object; the cached transform keeps being used.
    assert!(host.scene.despawn("CloudsBox"));
    assert!(host.scene.find("CloudsBox").is_none());
    assert_eq!(host.render(&mut feature), (1, 1));
    assert!(feature.has_clouds_box());
}

#[test]
fn cached_box_still_tracks_its_transform() {
    let mut host = Host::new(SoftwareBackend::new(), 16, 16);
    let clouds_box = host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::new(20.0, 10.0, 20.0));
    let mut feature = feature();
    assert_eq!(host.render(&mut feature), (1, 1));

    host.scene.rename("CloudsBox", "Renamed");
    clouds_box.set_position(Vec3::new(0.0, 100.0, 0.0));

    // Material is only held between setup and cleanup, so grab the values while
    // the feature still owns it.
    assert_eq!(host.render(&mut feature), (1, 1));
    let material = feature.material().unwrap();
    let params = material.parameters();
    let min = params.vector(ShaderParam::CloudsBoundsMin);
    let max = params.vector(ShaderParam::CloudsBoundsMax);

    // Camera sits at (0, 0, 60).
    assert_eq!((min + max) * 0.5, Vec4::new(0.0, 100.0, -60.0, 0.0));
    assert_eq!(max - min, Vec4::new(20.0, 10.0, 20.0, 0.0));
}

#[test]
fn unchanged_target_reuses_the_scratch_target() {
    let mut host = ready_host(32, 16);
    let mut feature = feature();

    host.render(&mut feature);
    let first = scratch_id(&feature);
    host.render(&mut feature);
    host.render(&mut feature);

    assert!(first.is_some());
    assert_eq!(scratch_id(&feature), first);
    assert_eq!(host.backend.stats().targets_allocated(), 1);
}

#[test]
fn resize_reallocates_exactly_once() {
    let mut host = ready_host(32, 16);
    let mut feature = feature();
    host.render(&mut feature);
    let before = scratch_id(&feature);

    host.resize(64, 32);
    host.render(&mut feature);
    let after = scratch_id(&feature);
    host.render(&mut feature);

    assert_ne!(before, after);
    assert_eq!(scratch_id(&feature), after);
    assert_eq!(host.backend.stats().targets_allocated(), 2);
    assert_eq!(host.backend.stats().targets_released(), 1);

    let pass = feature.pass().unwrap().lock();
    let descriptor = pass.scratch().get().unwrap().descriptor();
    assert_eq!((descriptor.width, descriptor.height), (64, 32));
}

#[test]
fn zero_sized_camera_target_skips_the_frame_then_recovers() {
    let mut host = ready_host(32, 16);
    let mut feature = feature();

    host.resize(0, 0);
    assert_eq!(host.render(&mut feature), (1, 0));
    assert_eq!(host.backend.stats().targets_allocated(), 0);
    assert_eq!(host.backend.stats().blits(), 0);

    host.resize(32, 16);
    assert_eq!(host.render(&mut feature), (1, 1));
    assert_eq!(host.backend.stats().targets_allocated(), 1);
}

#[test]
fn msaa_camera_target_still_gets_a_single_sample_scratch() {
    let mut host = ready_host(16, 16);
    host.descriptor = host.descriptor.with_sample_count(4).with_depth_bits(24);
    let mut feature = feature();
    host.render(&mut feature);

    let pass = feature.pass().unwrap().lock();
    let descriptor = pass.scratch().get().unwrap().descriptor();
    assert_eq!(descriptor.sample_count, 1);
    assert_eq!(descriptor.depth_bits, 0);
}

#[test]
fn dispose_releases_everything_and_is_idempotent() {
    let mut host = ready_host(16, 16);
    let mut feature = feature();
    host.render(&mut feature);
    assert_eq!(host.backend.stats().live_targets(), 1);
    assert_eq!(host.backend.stats().live_materials(), 1);

    feature.dispose();
    assert!(feature.pass().is_none());
    assert!(feature.material().is_none());
    assert_eq!(host.backend.stats().live_targets(), 0);
    assert_eq!(host.backend.stats().live_materials(), 0);

    feature.dispose();
    assert_eq!(host.backend.stats().targets_released(), 1);
    assert_eq!(host.backend.stats().materials_destroyed(), 1);
}

#[test]
fn feature_can_be_recreated_after_dispose() {
    let mut host = ready_host(16, 16);
    let mut feature = feature();
    host.render(&mut feature);
    feature.dispose();

    feature.create();
    assert_eq!(host.render(&mut feature), (1, 1));
    assert_eq!(host.backend.stats().materials_created(), 2);
    assert_eq!(host.backend.stats().live_materials(), 1);
}

#[test]
fn create_is_idempotent() {
    let mut feature = feature();
    let pass = feature.pass().unwrap().clone();
    feature.create();
    assert!(std::sync::Arc::ptr_eq(&pass, feature.pass().unwrap()));
}

#[test]
fn registry_rejects_a_second_clouds_feature() {
    let mut registry = FeatureRegistry::<SoftwareBackend>::new();
    registry
        .register(VolumetricCloudsFeature::new(VolumetricCloudsSettings::default()))
        .unwrap();
    let second = registry.register(VolumetricCloudsFeature::new(VolumetricCloudsSettings::default()));

    assert!(matches!(second, Err(Error::Feature(_))));
    assert_eq!(registry.len(), 1);
    assert!(registry
        .get_typed_mut::<VolumetricCloudsFeature<SoftwareBackend>>("volumetric_clouds")
        .is_some());
}
