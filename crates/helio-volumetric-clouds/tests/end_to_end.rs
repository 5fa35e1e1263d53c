mod common;

use common::{Host, BACKGROUND};
use glam::Vec3;
use helio_volumetric_clouds::backend::software::{RecordedCommand, SoftwareBackend};
use helio_volumetric_clouds::backend::RenderTarget;
use helio_volumetric_clouds::passes::volumetric_clouds::{CLOUDS_TEXTURE_NAME, PROFILING_LABEL};
use helio_volumetric_clouds::{RendererFeature, VolumetricCloudsFeature, VolumetricCloudsSettings};

#[test]
fn full_hd_frame_composites_clouds_inside_the_box_only() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut host = Host::new(SoftwareBackend::new(), 1920, 1080);
    host.descriptor = host.descriptor.with_depth_bits(24);
    host.scene.spawn("CloudsBox", Vec3::ZERO, Vec3::new(20.0, 10.0, 20.0));

    let mut feature = VolumetricCloudsFeature::<SoftwareBackend>::new(VolumetricCloudsSettings::default());
    feature.create();
    assert_eq!(host.render(&mut feature), (1, 1));

    // Exactly one scratch target, full size, single-sample, no depth.
    let stats = host.backend.stats();
    assert_eq!(stats.targets_allocated(), 1);
    {
        let pass = feature.pass().unwrap().lock();
        let scratch = pass.scratch().get().unwrap();
        let descriptor = scratch.descriptor();
        assert_eq!(scratch.label(), CLOUDS_TEXTURE_NAME);
        assert_eq!((descriptor.width, descriptor.height), (1920, 1080));
        assert_eq!(descriptor.sample_count, 1);
        assert_eq!(descriptor.depth_bits, 0);
    }

    // Exactly two blits: camera -> scratch through pass 0, scratch -> camera.
    assert_eq!(stats.blits(), 2);
    let blits: Vec<_> = host
        .backend
        .submitted_commands()
        .into_iter()
        .filter_map(|c| match c {
            RecordedCommand::Blit { source, destination, pass } => Some((source, destination, pass)),
            _ => None,
        })
        .collect();
    let camera = host.color.id();
    assert_eq!(blits.len(), 2);
    assert_eq!(blits[0].0, camera);
    assert_eq!(blits[0].2, Some(0));
    assert_eq!(blits[1].1, camera);
    assert_eq!(blits[1].2, None);
    assert_eq!(blits[0].1, blits[1].0);
    assert!(host
        .backend
        .submitted_commands()
        .contains(&RecordedCommand::PushDebugGroup(PROFILING_LABEL.to_string())));

    // Outside the projected box the image is untouched.
    for (x, y) in [(0, 0), (1919, 0), (0, 1079), (1919, 1079), (1400, 540), (960, 800)] {
        assert_eq!(host.color.pixel(x, y), BACKGROUND, "pixel ({x}, {y}) changed");
    }

    // Through the middle of the box the clouds cover the background.
    let center = host.color.pixel(960, 540);
    assert_ne!(center, BACKGROUND);
    assert!(center.z < BACKGROUND.z, "cloud should absorb the blue background: {center}");
    assert!(center.x > 0.0 && center.y > 0.0, "cloud should scatter sun light: {center}");
    assert_eq!(center.w, BACKGROUND.w);
}
