// tests/test_guided_filter.rs: edge-aware mask refinement through the public API.

use edgematte::gpu::{Limits, RenderContext};
use edgematte::guided::{GuidedFilter, DEFAULT_EPSILON};
use edgematte::segmentation::Mask;
use image::{Rgba, RgbaImage};

fn ctx() -> RenderContext {
    RenderContext::new(Limits::default()).unwrap()
}

fn checkerboard(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([230, 230, 230, 255])
        } else {
            Rgba([20, 20, 20, 255])
        }
    })
}

/// Mask whose value only depends on the column.
fn column_mask(columns: &[u8], height: usize) -> Mask {
    let data = (0..height).flat_map(|_| columns.iter().copied()).collect();
    Mask::from_vec(columns.len(), height, data).unwrap()
}

/// `q` of every pixel, from the filter's output texture.
fn refined(ctx: &RenderContext, gf: &GuidedFilter) -> Vec<Vec<f32>> {
    let out = ctx.read_texture(gf.output().name()).unwrap();
    (0..out.height())
        .map(|y| (0..out.width()).map(|x| out.texel(x, y)[0]).collect())
        .collect()
}

// ===== Geometry =====

#[test]
fn large_radius_works_at_quarter_resolution() {
    let mut ctx = ctx();
    let mut gf = GuidedFilter::new(&ctx).unwrap();
    gf.setup(&mut ctx, 8, DEFAULT_EPSILON, 40, 20).unwrap();
    assert_eq!(gf.working_size(), (10, 5));
    assert_eq!(gf.sub_radius(), 2);
    assert_eq!(gf.output_size(), (40, 20));

    // A second setup replaces the targets.
    gf.setup(&mut ctx, 8, DEFAULT_EPSILON, 3, 2).unwrap();
    assert_eq!(gf.working_size(), (1, 1));
    let out = ctx.read_texture(gf.output().name()).unwrap();
    assert_eq!((out.width(), out.height()), (3, 2));
}

// ===== Refinement =====

#[test]
fn zero_radius_returns_the_mask() {
    let mut ctx = ctx();
    let mut gf = GuidedFilter::new(&ctx).unwrap();
    gf.setup(&mut ctx, 0, DEFAULT_EPSILON, 6, 4).unwrap();
    let mask = column_mask(&[255, 0, 255, 255, 0, 0], 4);
    gf.apply(&mut ctx, &checkerboard(6, 4), &mask).unwrap();

    for row in refined(&ctx, &gf) {
        assert_eq!(row, vec![1.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }
}

#[test]
fn small_mask_is_sampled_up_to_the_output() {
    let mut ctx = ctx();
    let mut gf = GuidedFilter::new(&ctx).unwrap();
    gf.setup(&mut ctx, 0, DEFAULT_EPSILON, 6, 4).unwrap();
    let mask = column_mask(&[255, 0, 255], 2);
    gf.apply(&mut ctx, &checkerboard(6, 4), &mask).unwrap();

    for row in refined(&ctx, &gf) {
        assert_eq!(row, vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
    }
}

#[test]
fn full_mask_stays_full_over_a_busy_guide() {
    let mut ctx = ctx();
    let mut gf = GuidedFilter::new(&ctx).unwrap();
    gf.setup(&mut ctx, 4, 1e-2, 24, 16).unwrap();
    let mask = Mask::from_vec(24, 16, vec![255; 24 * 16]).unwrap();
    gf.apply(&mut ctx, &checkerboard(24, 16), &mask).unwrap();

    for row in refined(&ctx, &gf) {
        for q in row {
            assert!((q - 1.0).abs() <= 2.0 / 255.0, "q = {q}");
        }
    }
}

#[test]
fn refined_edge_is_monotonic_across_a_flat_guide() {
    let mut ctx = ctx();
    let mut gf = GuidedFilter::new(&ctx).unwrap();
    gf.setup(&mut ctx, 2, DEFAULT_EPSILON, 16, 4).unwrap();
    let mut columns = vec![255u8; 8];
    columns.extend([0u8; 8]);
    let mask = column_mask(&columns, 4);
    let guide = RgbaImage::from_pixel(16, 4, Rgba([128, 128, 128, 255]));
    gf.apply(&mut ctx, &guide, &mask).unwrap();

    for row in refined(&ctx, &gf) {
        assert!((row[0] - 1.0).abs() <= 1.0 / 255.0);
        assert!(row[15].abs() <= 1.0 / 255.0);
        // A flat guide carries no edge, so the step is smoothed.
        assert!(row[7] < 1.0 && row[8] > 0.0, "{row:?}");
        for pair in row.windows(2) {
            assert!(pair[1] <= pair[0] + 1.0 / 255.0, "{row:?}");
        }
    }
}

#[test]
fn release_then_apply_is_rejected() {
    let mut ctx = ctx();
    let mut gf = GuidedFilter::new(&ctx).unwrap();
    gf.setup(&mut ctx, 2, DEFAULT_EPSILON, 4, 4).unwrap();
    gf.release(&mut ctx);
    assert!(!gf.is_ready());
    let mask = Mask::from_vec(4, 4, vec![0; 16]).unwrap();
    assert!(gf.apply(&mut ctx, &checkerboard(4, 4), &mask).is_err());
}
