// tests/test_compositor.rs: end-to-end compositing through the public API.

use edgematte::gpu::{Limits, RenderContext};
use edgematte::segmentation::{palette, ClassScoreMap, PERSON_CLASS, VOC_LABELS};
use edgematte::{Compositor, Effect, FxError, PipelineConfig};
use image::{Rgba, RgbaImage};

/// Score map where `class_at(x, y)` wins every pixel.
fn score_map(
    w: usize,
    h: usize,
    classes: usize,
    class_at: impl Fn(usize, usize) -> usize,
) -> ClassScoreMap {
    let mut data = vec![0.0f32; w * h * classes];
    for y in 0..h {
        for x in 0..w {
            data[(y * w + x) * classes + class_at(x, y)] = 1.0;
        }
    }
    let labels = if classes == VOC_LABELS.len() {
        VOC_LABELS.iter().map(|s| s.to_string()).collect()
    } else {
        (0..classes).map(|i| format!("class {i}")).collect()
    };
    ClassScoreMap::new(data, [w, h, classes], [w, h], labels).unwrap()
}

fn compositor(config: PipelineConfig) -> Compositor {
    let ctx = RenderContext::new(Limits::default()).unwrap();
    Compositor::with_config(ctx, config).unwrap()
}

fn fill_config() -> PipelineConfig {
    PipelineConfig {
        effect: Effect::Fill,
        zoom: 1,
        refine_radius: 0,
        fill_color: [10, 20, 30],
        target_class: PERSON_CLASS,
        ..PipelineConfig::default()
    }
}

fn assert_close(got: [u8; 4], want: [u8; 4], tol: i32) {
    for c in 0..4 {
        assert!(
            (got[c] as i32 - want[c] as i32).abs() <= tol,
            "got {got:?}, want {want:?}"
        );
    }
}

// ===== Fill =====

#[test]
fn two_by_two_fill_keeps_diagonal_subject() {
    let guide = RgbaImage::from_fn(2, 2, |x, y| match (x, y) {
        (0, 0) => Rgba([255, 0, 0, 255]),
        (1, 0) => Rgba([0, 255, 0, 255]),
        (0, 1) => Rgba([0, 0, 255, 255]),
        _ => Rgba([255, 255, 0, 255]),
    });
    // Mask [255, 0, 0, 255]: subject on the main diagonal.
    let scores = score_map(2, 2, 21, |x, y| if x == y { PERSON_CLASS } else { 0 });

    let mut c = compositor(fill_config());
    c.upload_source(guide.clone(), (2, 2)).unwrap();
    let mut pipeline = c.reconfigure(fill_config()).unwrap();
    pipeline.draw(Some(scores)).unwrap();

    let out = c.snapshot().unwrap();
    assert_eq!(out.dimensions(), (2, 2));
    assert_eq!(out.get_pixel(0, 0).0, guide.get_pixel(0, 0).0);
    assert_eq!(out.get_pixel(1, 1).0, guide.get_pixel(1, 1).0);
    assert_eq!(out.get_pixel(1, 0).0, [10, 20, 30, 255]);
    assert_eq!(out.get_pixel(0, 1).0, [10, 20, 30, 255]);
}

#[test]
fn background_color_change_redraws_from_last_mask() {
    let mut c = compositor(fill_config());
    c.setup().unwrap();
    c.upload_source(RgbaImage::from_pixel(2, 2, Rgba([200, 200, 200, 255])), (2, 2))
        .unwrap();
    c.draw_outputs(Some(score_map(2, 2, 21, |x, _| if x == 0 { PERSON_CLASS } else { 0 })))
        .unwrap();

    let drawn = c.set_background_color([0, 0, 255]).unwrap();
    assert!(drawn.is_some());
    let out = c.snapshot().unwrap();
    assert_eq!(out.get_pixel(0, 0).0, [200, 200, 200, 255]);
    assert_eq!(out.get_pixel(1, 0).0, [0, 0, 255, 255]);
}

// ===== Resolution changes =====

#[test]
fn new_clipped_size_reallocates_every_target() {
    let config = PipelineConfig {
        refine_radius: 4,
        ..fill_config()
    };
    let mut c = compositor(config);
    c.setup().unwrap();

    for (w, h) in [(100usize, 100usize), (200, 150)] {
        let image = RgbaImage::from_pixel(w as u32, h as u32, Rgba([255, 255, 255, 255]));
        c.upload_source(image, (w, h)).unwrap();
        c.draw_outputs(Some(score_map(w, h, 21, |x, _| {
            if x < w / 2 {
                PERSON_CLASS
            } else {
                0
            }
        })))
        .unwrap();

        let out = c.snapshot().unwrap();
        assert_eq!(out.dimensions(), (w as u32, h as u32));
        for target in ["extract", "styledBg"] {
            assert_eq!(c.context().render_target_size(target), Some((w, h)), "{target}");
        }
        // Far from the mask edge the composite is exact.
        assert_eq!(out.get_pixel(0, h as u32 / 2).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(w as u32 - 1, h as u32 / 2).0, [10, 20, 30, 255]);
    }
}

#[test]
fn blur_output_follows_zoom() {
    let config = PipelineConfig {
        effect: Effect::Blur,
        zoom: 2,
        blur_radius: 3,
        blur_sigma: 2.0,
        refine_radius: 2,
        ..fill_config()
    };
    let mut c = compositor(config);
    c.setup().unwrap();
    c.upload_source(RgbaImage::from_pixel(6, 4, Rgba([90, 60, 30, 255])), (6, 4))
        .unwrap();
    c.draw_outputs(Some(score_map(6, 4, 21, |_, _| 0))).unwrap();

    let out = c.snapshot().unwrap();
    assert_eq!(out.dimensions(), (12, 8));
    // A flat background blurs to itself.
    assert_close(out.get_pixel(5, 3).0, [90, 60, 30, 255], 1);

    c.set_zoom(3).unwrap();
    assert_eq!(c.snapshot().unwrap().dimensions(), (18, 12));
}

// ===== Mode switching =====

#[test]
fn switching_effects_back_and_forth_is_stable() {
    let image = RgbaImage::from_fn(8, 6, |x, y| Rgba([(x * 30) as u8, (y * 40) as u8, 77, 255]));
    let scores = || score_map(8, 6, 21, |x, y| if x + y < 7 { PERSON_CLASS } else { 0 });
    let config = PipelineConfig {
        refine_radius: 2,
        ..fill_config()
    };

    let mut reference = compositor(config.clone());
    reference.setup().unwrap();
    reference.upload_source(image.clone(), (8, 6)).unwrap();
    reference.draw_outputs(Some(scores())).unwrap();
    let expected = reference.snapshot().unwrap();

    let mut c = compositor(config);
    c.setup().unwrap();
    c.upload_source(image, (8, 6)).unwrap();
    c.draw_outputs(Some(scores())).unwrap();

    c.set_effect(Effect::Fill).unwrap();
    assert_eq!(c.snapshot().unwrap(), expected);

    c.set_effect(Effect::Blur).unwrap();
    c.set_effect(Effect::Label).unwrap();
    c.set_effect(Effect::Fill).unwrap();
    assert_eq!(c.snapshot().unwrap(), expected);
}

// ===== Label overlay =====

#[test]
fn label_overlay_mixes_palette_and_builds_legend() {
    let config = PipelineConfig {
        effect: Effect::Label,
        zoom: 1,
        color_map_alpha: 0.5,
        ..PipelineConfig::default()
    };
    let mut c = compositor(config);
    c.setup().unwrap();
    c.upload_source(RgbaImage::from_pixel(4, 2, Rgba([100, 100, 100, 255])), (4, 2))
        .unwrap();
    let classes = [[0, 15, 15, 3], [0, 0, 3, 3]];
    c.draw_outputs(Some(score_map(4, 2, 21, |x, y| classes[y][x])))
        .unwrap();

    let out = c.snapshot().unwrap();
    for y in 0..2 {
        for x in 0..4 {
            let [r, g, b] = palette::color(classes[y][x]);
            let mix = |p: u8| ((100.0 + p as f32) / 2.0).round() as u8;
            assert_close(
                out.get_pixel(x as u32, y as u32).0,
                [mix(r), mix(g), mix(b), 255],
                1,
            );
        }
    }

    let legend = c.legend();
    assert_eq!(legend.keys().copied().collect::<Vec<_>>(), vec![0, 3, 15]);
    assert_eq!(legend[&15].name, "person");
    assert_eq!(legend[&3].rgb, palette::color(3));

    assert_eq!(c.hit_test(Some((1.5, 0.5))), Some(15));
    assert_eq!(c.hit_test(Some((3.2, 1.9))), Some(3));
    assert_eq!(c.hit_test(None), None);
}

#[test]
fn alpha_change_only_redraws() {
    let config = PipelineConfig {
        effect: Effect::Label,
        zoom: 1,
        color_map_alpha: 0.0,
        ..PipelineConfig::default()
    };
    let mut c = compositor(config);
    c.setup().unwrap();
    c.upload_source(RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255])), (2, 1))
        .unwrap();
    c.draw_outputs(Some(score_map(2, 1, 21, |_, _| 15))).unwrap();
    assert_eq!(c.snapshot().unwrap().get_pixel(0, 0).0, [10, 20, 30, 255]);

    let calls = c.context().draw_calls();
    c.set_color_map_alpha(1.0).unwrap();
    assert_eq!(c.context().draw_calls() - calls, 1);
    let [r, g, b] = palette::color(15);
    assert_eq!(c.snapshot().unwrap().get_pixel(0, 0).0, [r, g, b, 255]);
}

// ===== Failure handling =====

#[test]
fn missing_float_targets_fails_construction() {
    let limits = Limits {
        float_render_targets: false,
        ..Limits::default()
    };
    let ctx = RenderContext::new(limits).unwrap();
    assert!(matches!(
        Compositor::new(ctx),
        Err(FxError::MissingCapability(_))
    ));
}

#[test]
fn incomplete_target_degrades_without_error() {
    // Extract needs two attachments; this backend only has one.
    let limits = Limits {
        max_color_attachments: 1,
        ..Limits::default()
    };
    let ctx = RenderContext::new(limits).unwrap();
    let mut c = Compositor::with_config(ctx, fill_config()).unwrap();
    c.setup().unwrap();
    c.upload_source(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])), (2, 2))
        .unwrap();
    assert!(c.draw_outputs(Some(score_map(2, 2, 21, |_, _| 0))).is_ok());
}

#[test]
fn lost_context_fails_setup() {
    let mut ctx = RenderContext::new(Limits::default()).unwrap();
    ctx.mark_lost();
    let mut c = Compositor::with_config(ctx, fill_config()).unwrap();
    assert!(matches!(c.setup(), Err(FxError::ContextUnavailable(_))));
}

// ===== Score maps =====

#[test]
fn padded_score_map_uses_its_scaled_region() {
    // 4x4 output of which only the top 4x2 holds the image.
    let mut data = vec![0.0f32; 4 * 4 * 21];
    for (i, px) in data.chunks_exact_mut(21).enumerate() {
        px[if i < 8 { 15 } else { 4 }] = 1.0;
    }
    let labels = VOC_LABELS.iter().map(|s| s.to_string()).collect();
    let map = ClassScoreMap::new(data, [4, 4, 21], [4, 2], labels).unwrap();
    assert_eq!(map.mask_extent(), (4, 2));

    let config = PipelineConfig {
        effect: Effect::Label,
        zoom: 2,
        ..PipelineConfig::default()
    };
    let mut c = compositor(config);
    c.setup().unwrap();
    c.upload_source(RgbaImage::new(4, 2), map.mask_extent()).unwrap();
    c.draw_outputs(Some(map)).unwrap();

    let labels = c.labels().unwrap();
    assert_eq!((labels.width(), labels.height()), (4, 2));
    assert_eq!(c.snapshot().unwrap().dimensions(), (8, 4));
    assert_eq!(c.legend().keys().copied().collect::<Vec<_>>(), vec![15]);
    assert_eq!(c.hit_test(Some((7.9, 3.9))), Some(15));
    assert_eq!(c.hit_test(Some((8.0, 0.0))), None);
}
