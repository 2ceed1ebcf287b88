//! Texture binding state machine against an instrumented backend.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{CountingBackend, pattern_image, solid_image};
use hostimage::gpu::{BindingOptions, FormatTriple, GpuError};
use hostimage::{HostImage, ImageFormat, TextureBinding, TextureState};

fn binding(backend: &Arc<CountingBackend>) -> TextureBinding<CountingBackend> {
    TextureBinding::new(Arc::clone(backend))
}

#[test_log::test]
fn dirtiness_drives_uploads() {
    let backend = Arc::new(CountingBackend::new());
    let mut image = pattern_image(6, 5, ImageFormat::RGBA8);
    let mut tex = binding(&backend);

    assert_eq!(tex.state(&image), TextureState::Absent);
    assert_eq!(backend.uploads(), 0);

    let first = tex.fetch(&image).expect("texture");
    assert_eq!(tex.state(&image), TextureState::Clean);
    assert_eq!(backend.uploads(), 1);

    // Repeated fetches while Clean upload nothing.
    for _ in 0..5 {
        assert_eq!(tex.fetch(&image), Some(first));
    }
    assert_eq!(backend.uploads(), 1);

    let mutations: [fn(&mut HostImage); 4] = [
        |img| img.set_pixel_f32(1, 1, &[0.5, 0.5, 0.5, 1.0]),
        |img| {
            let patch = img.sub_image(0, 0, 2, 2).unwrap();
            img.set_sub_image(3, 2, &patch).unwrap();
        },
        |img| img.clear(),
        |img| img.set_component_u8(0, 0, 2, 9),
    ];
    for (i, mutate) in mutations.iter().enumerate() {
        mutate(&mut image);
        assert_eq!(tex.state(&image), TextureState::Dirty, "mutation {i}");
        let handle = tex.fetch(&image).expect("texture");
        assert_eq!(handle, first, "same shape refills the texture");
        assert_eq!(tex.state(&image), TextureState::Clean);
        assert_eq!(backend.uploads(), 2 + i);
        tex.fetch(&image);
        assert_eq!(backend.uploads(), 2 + i);
    }

    assert_eq!(backend.creates.load(Ordering::SeqCst), 1);
    assert_eq!(backend.texture_bytes(first).unwrap(), image.pixels());
}

#[test]
fn every_upload_is_fenced() {
    let backend = Arc::new(CountingBackend::new());
    let mut image = pattern_image(2, 2, ImageFormat::RGB8);
    let mut tex = binding(&backend);
    tex.fetch(&image);
    image.mark_modified();
    tex.fetch(&image);
    assert_eq!(backend.finishes.load(Ordering::SeqCst), 2);
}

#[test_log::test]
fn failed_acquire_leaves_binding_absent() {
    let backend = Arc::new(CountingBackend::new());
    backend.set_fail_acquire(true);
    let image = pattern_image(4, 4, ImageFormat::RGBA8);
    let mut tex = binding(&backend);

    assert_eq!(tex.fetch(&image), None);
    assert_eq!(tex.state(&image), TextureState::Absent);
    assert!(matches!(tex.try_fetch(&image), Err(GpuError::NoContext(_))));

    backend.set_fail_acquire(false);
    assert!(tex.fetch(&image).is_some());
    assert_eq!(tex.state(&image), TextureState::Clean);
}

#[test_log::test]
fn failed_refill_keeps_previous_texture() {
    let backend = Arc::new(CountingBackend::new());
    let mut image = pattern_image(4, 4, ImageFormat::RGBA8);
    let mut tex = binding(&backend);
    let handle = tex.fetch(&image).unwrap();
    let uploaded = image.pixels().to_vec();

    image.clear();
    backend.set_fail_upload(true);
    assert_eq!(tex.fetch(&image), None);
    assert_eq!(tex.state(&image), TextureState::Dirty);
    assert_eq!(tex.handle(), Some(handle));
    assert_eq!(backend.texture_bytes(handle).unwrap(), uploaded);

    backend.set_fail_upload(false);
    assert_eq!(tex.fetch(&image), Some(handle));
    assert_eq!(tex.state(&image), TextureState::Clean);
}

#[test]
fn fence_timeout_on_new_texture_releases_it() {
    let backend = Arc::new(CountingBackend::new());
    backend.set_fail_finish(true);
    let image = pattern_image(3, 3, ImageFormat::RGBA8);
    let mut tex = binding(&backend);

    assert!(matches!(tex.try_fetch(&image), Err(GpuError::FenceTimeout(_))));
    assert_eq!(tex.state(&image), TextureState::Absent);
    assert_eq!(backend.live_textures(), 0);
}

#[test]
fn released_binding_can_follow_another_image() {
    let backend = Arc::new(CountingBackend::new());
    let small = pattern_image(4, 4, ImageFormat::RGBA8);
    let mut tex = binding(&backend);
    let first = tex.fetch(&small).unwrap();

    tex.release().unwrap();
    assert_eq!(backend.destroyed(), 1);
    assert_eq!(tex.state(&small), TextureState::Absent);

    let big = small.resize(8, 8).unwrap();
    let second = tex.fetch(&big).unwrap();
    assert_ne!(first, second);
    assert_eq!(tex.image_id(), Some(big.id()));
    assert_eq!(backend.live_textures(), 1);
}

#[test]
fn binding_refuses_a_foreign_image() {
    let backend = Arc::new(CountingBackend::new());
    let a = pattern_image(2, 2, ImageFormat::RGBA8);
    let b = a.copy();
    let mut tex = binding(&backend);
    tex.fetch(&a).unwrap();

    assert!(matches!(tex.try_fetch(&b), Err(GpuError::Unsupported(_))));
    assert_eq!(tex.fetch(&b), None);
    assert_eq!(tex.image_id(), Some(a.id()));
    assert_eq!(tex.state(&b), TextureState::Dirty);
    assert_eq!(backend.uploads(), 1);
}

#[test]
fn dropping_the_binding_destroys_the_texture() {
    let backend = Arc::new(CountingBackend::new());
    let image = pattern_image(2, 2, ImageFormat::GREY8);
    {
        let mut tex = binding(&backend);
        tex.fetch(&image).unwrap();
        assert_eq!(backend.live_textures(), 1);
    }
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.destroyed(), 1);
}

#[test]
fn dropping_an_absent_binding_touches_nothing() {
    let backend = Arc::new(CountingBackend::new());
    drop(binding(&backend));
    assert_eq!(backend.acquires.load(Ordering::SeqCst), 0);
}

#[test]
fn read_back_returns_the_uploaded_pixels() {
    let backend = Arc::new(CountingBackend::new());
    let mut tex = binding(&backend);
    assert!(tex.read_back().is_err());

    for format in ImageFormat::all() {
        let image = pattern_image(5, 3, format);
        tex.release().unwrap();
        tex.fetch(&image).unwrap();
        let back = tex.read_back().unwrap();
        assert_eq!(back, image, "{format}");
    }
}

#[test]
fn options_reach_the_fence() {
    let backend = Arc::new(CountingBackend::new());
    let options = BindingOptions {
        generate_mipmaps: false,
        fence_timeout: Duration::from_millis(50),
    };
    let mut tex = TextureBinding::with_options(Arc::clone(&backend), options);
    assert_eq!(tex.options(), options);

    backend.set_fail_finish(true);
    let image = solid_image(2, 2, ImageFormat::RGBA32F, &[0.25, 0.5, 0.75, 1.0]);
    match tex.try_fetch(&image) {
        Err(GpuError::FenceTimeout(t)) => assert_eq!(t, Duration::from_millis(50)),
        other => panic!("expected fence timeout, got {other:?}"),
    }
}

#[test]
fn texture_triple_follows_the_image_format() {
    let backend = Arc::new(CountingBackend::new());
    let mut tex = binding(&backend);
    let image = solid_image(2, 2, ImageFormat::RGBA32F, &[0.25, 0.5, 0.75, 1.0]);
    let handle = tex.fetch(&image).unwrap();
    assert_eq!(backend.texture_bytes(handle).unwrap().len(), 2 * 2 * 16);
    assert_ne!(
        FormatTriple::for_format(&ImageFormat::RGBA8),
        FormatTriple::for_format(&image.format())
    );
}
