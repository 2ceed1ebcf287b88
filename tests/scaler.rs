//! Resizing: alpha handling, background blending, step planning.

mod common;

use common::{pattern_image, solid_image};
use hostimage::scaler::{limited_size, plan_steps, resize};
use hostimage::{ImageError, ImageFormat, ScaleFilter, ScaleQuality, Scaler};

#[test]
fn solid_colour_survives_every_quality() {
    let image = solid_image(64, 48, ImageFormat::RGBA8, &[0.2, 0.4, 0.6, 1.0]);
    for quality in [ScaleQuality::Fast, ScaleQuality::Balanced, ScaleQuality::High] {
        for (w, h) in [(10, 7), (128, 96), (64, 1)] {
            let out = Scaler::new(quality).scale(&image, w, h).unwrap();
            assert_eq!(out.dimensions(), (w, h));
            assert_eq!(out.format(), ImageFormat::RGBA8);
            let mut px = [0u8; 4];
            out.pixel_bytes(w / 2, h / 2, &mut px);
            for (got, want) in px.iter().zip([51u8, 102, 153, 255]) {
                assert!(got.abs_diff(want) <= 1, "{quality:?} {w}x{h}: {px:?}");
            }
        }
    }
}

#[test]
fn transparent_pixels_do_not_bleed_colour() {
    let mut image = solid_image(8, 1, ImageFormat::RGBA32F, &[0.0, 1.0, 0.0, 0.0]);
    for x in 0..4 {
        image.set_pixel_f32(x, 0, &[1.0, 0.0, 0.0, 1.0]);
    }
    let out = Scaler::new(ScaleQuality::Balanced).scale(&image, 4, 1).unwrap();
    let mut px = [0f32; 4];
    for x in 0..4 {
        out.pixel_f32(x, 0, &mut px);
        if px[3] > 0.01 {
            assert!(px[1] < 1e-3, "green leaked into pixel {x}: {px:?}");
        }
    }
}

#[test]
fn background_fills_transparent_and_flattens_partial_alpha() {
    let clear = solid_image(8, 8, ImageFormat::RGBA8, &[1.0, 1.0, 1.0, 0.0]);
    let out = resize(&clear, 4, 4, ScaleQuality::Balanced, Some([0.0, 0.0, 1.0])).unwrap();
    assert!(out.pixels().chunks_exact(4).all(|p| p == [0, 0, 255, 0]));

    let half = solid_image(8, 8, ImageFormat::RGBA8, &[1.0, 0.0, 0.0, 0.5]);
    let out = resize(&half, 4, 4, ScaleQuality::High, Some([0.0, 0.0, 1.0])).unwrap();
    for p in out.pixels().chunks_exact(4) {
        assert!(p[0].abs_diff(128) <= 1 && p[1] == 0 && p[2].abs_diff(127) <= 1 && p[3] == 255, "{p:?}");
    }
}

#[test]
fn background_applies_even_without_resizing() {
    let clear = solid_image(3, 3, ImageFormat::RGBA8, &[0.5, 0.5, 0.5, 0.0]);
    let out = Scaler::default().with_background(Some([1.0, 0.0, 0.0])).scale(&clear, 3, 3).unwrap();
    assert!(out.pixels().chunks_exact(4).all(|p| p == [255, 0, 0, 0]));
}

#[test]
fn high_quality_visits_halving_steps() {
    assert_eq!(plan_steps((64, 64), (10, 10), ScaleQuality::High), vec![(32, 32), (16, 16), (10, 10)]);
    assert_eq!(plan_steps((64, 64), (10, 10), ScaleQuality::Balanced), vec![(10, 10)]);
    assert!(plan_steps((5, 5), (5, 5), ScaleQuality::High).is_empty());
}

#[test]
fn scale_to_format_converts_the_result() {
    let image = pattern_image(16, 16, ImageFormat::RGBA8);
    let out = Scaler::new(ScaleQuality::Fast)
        .with_filter(ScaleFilter::Lanczos3)
        .scale_to_format(&image, 8, 8, ImageFormat::GREY8)
        .unwrap();
    assert_eq!(out.format(), ImageFormat::GREY8);
    assert_eq!(out.dimensions(), (8, 8));
}

#[test]
fn every_filter_produces_the_requested_size() {
    let image = pattern_image(20, 12, ImageFormat::RGB8);
    for &filter in ScaleFilter::all() {
        let out = Scaler::default().with_filter(filter).scale(&image, 7, 5).unwrap();
        assert_eq!(out.dimensions(), (7, 5), "{filter:?}");
    }
}

#[test]
fn zero_target_is_rejected() {
    let image = pattern_image(4, 4, ImageFormat::RGBA8);
    assert!(matches!(
        Scaler::default().scale(&image, 0, 4),
        Err(ImageError::InvalidDimensions { width: 0, height: 4 })
    ));
}

#[test]
fn limited_scaling_clamps_longest_edge() {
    assert_eq!(limited_size((100, 50), 4.0, 4.0, 200), Some((200, 100)));
    assert_eq!(limited_size((100, 50), 0.5, 0.5, 1000), Some((50, 25)));
    assert_eq!(limited_size((100, 50), 0.001, 0.001, 1000), None);

    let image = pattern_image(100, 50, ImageFormat::RGB8);
    let out = Scaler::default().scale_limited(&image, 4.0, 4.0, 200).unwrap().unwrap();
    assert_eq!(out.dimensions(), (200, 100));
    assert!(Scaler::default().scale_limited(&image, 0.0, 1.0, 200).unwrap().is_none());
}

#[test]
fn same_size_resize_is_a_copy() {
    let image = pattern_image(9, 9, ImageFormat::RGBA8);
    let out = image.resize(9, 9).unwrap();
    assert_eq!(out, image);
    assert_ne!(out.id(), image.id());
}
