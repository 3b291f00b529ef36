// tests/test_backend_parity.rs: the wgpu backend against the software reference.
//
// Each case renders the same input on both backends and compares the
// results texel by texel. Machines without an adapter (or without float
// filtering, which the guided filter needs) skip the comparison.

#[cfg(feature = "gpu")]
mod parity {
    use edgematte::gpu::{BackendKind, RenderContext};
    use edgematte::guided::{GuidedFilter, DEFAULT_EPSILON};
    use edgematte::segmentation::{ClassScoreMap, Mask, PERSON_CLASS, VOC_LABELS};
    use edgematte::{Compositor, Effect, PipelineConfig};
    use image::{Rgba, RgbaImage};

    fn software() -> RenderContext {
        RenderContext::for_backend(BackendKind::Software).unwrap()
    }

    fn wgpu() -> Option<RenderContext> {
        match RenderContext::for_backend(BackendKind::Wgpu) {
            Ok(ctx) if ctx.limits().float_linear_filtering => Some(ctx),
            Ok(_) => {
                eprintln!("skipping: adapter cannot filter float textures");
                None
            }
            Err(e) if e.to_string().contains("no gpu adapter available") => {
                eprintln!("skipping: {e}");
                None
            }
            Err(e) => panic!("wgpu backend failed to start: {e}"),
        }
    }

    fn guide(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            let v = if (x / 3 + y / 2) % 2 == 0 { 220 } else { 40 };
            Rgba([v, (x * 255 / w) as u8, (y * 255 / h) as u8, 255])
        })
    }

    /// A disc of `PERSON_CLASS` on background, with a second class in one corner.
    fn scores(w: usize, h: usize) -> ClassScoreMap {
        let classes = VOC_LABELS.len();
        let mut data = vec![0.0f32; w * h * classes];
        for y in 0..h {
            for x in 0..w {
                let dx = x as f32 - w as f32 / 2.0;
                let dy = y as f32 - h as f32 / 2.0;
                let class = if dx * dx + dy * dy < (w.min(h) as f32 / 3.0).powi(2) {
                    PERSON_CLASS
                } else if x < 2 && y < 2 {
                    7
                } else {
                    0
                };
                data[(y * w + x) * classes + class] = 1.0;
            }
        }
        let labels = VOC_LABELS.iter().map(|s| s.to_string()).collect();
        ClassScoreMap::new(data, [w, h, classes], [w, h], labels).unwrap()
    }

    fn composite(ctx: RenderContext, config: &PipelineConfig) -> RgbaImage {
        let (w, h) = (12, 10);
        let mut c = Compositor::with_config(ctx, config.clone()).unwrap();
        c.upload_source(guide(w as u32, h as u32), (w, h)).unwrap();
        let mut pipeline = c.reconfigure(config.clone()).unwrap();
        pipeline.draw(Some(scores(w, h))).unwrap();
        c.snapshot().unwrap()
    }

    fn assert_images_close(cpu: &RgbaImage, gpu: &RgbaImage, tol: i32) {
        assert_eq!(cpu.dimensions(), gpu.dimensions());
        for (x, y, a) in cpu.enumerate_pixels() {
            let b = gpu.get_pixel(x, y);
            for c in 0..4 {
                assert!(
                    (a.0[c] as i32 - b.0[c] as i32).abs() <= tol,
                    "({x}, {y}): software {:?}, wgpu {:?}",
                    a.0,
                    b.0
                );
            }
        }
    }

    // ===== Guided filter =====

    fn refine(mut ctx: RenderContext, radius: usize) -> Vec<f32> {
        let (w, h) = (24, 16);
        let mask: Vec<u8> = (0..w * h)
            .map(|i| if (i % w) < w / 2 { 255 } else { 0 })
            .collect();
        let mask = Mask::from_vec(w, h, mask).unwrap();
        let mut gf = GuidedFilter::new(&ctx).unwrap();
        gf.setup(&mut ctx, radius, DEFAULT_EPSILON, w, h).unwrap();
        let out = gf.apply(&mut ctx, &guide(w as u32, h as u32), &mask).unwrap();
        let tex = ctx.read_texture(out.name()).unwrap();
        tex.texels().iter().map(|t| t[0]).collect()
    }

    #[test]
    fn guided_filter_matches_at_full_resolution() {
        let Some(gpu) = wgpu() else { return };
        let a = refine(software(), 2);
        let b = refine(gpu, 2);
        for (i, (a, b)) in a.iter().zip(&b).enumerate() {
            assert!((a - b).abs() < 0.01, "texel {i}: software {a}, wgpu {b}");
        }
    }

    #[test]
    fn guided_filter_matches_when_subsampled() {
        let Some(gpu) = wgpu() else { return };
        let a = refine(software(), 8);
        let b = refine(gpu, 8);
        for (i, (a, b)) in a.iter().zip(&b).enumerate() {
            assert!((a - b).abs() < 0.02, "texel {i}: software {a}, wgpu {b}");
        }
    }

    // ===== Effects =====

    #[test]
    fn fill_composite_matches() {
        let Some(gpu) = wgpu() else { return };
        let config = PipelineConfig {
            effect: Effect::Fill,
            zoom: 1,
            refine_radius: 2,
            fill_color: [10, 200, 30],
            ..PipelineConfig::default()
        };
        assert_images_close(&composite(software(), &config), &composite(gpu, &config), 2);
    }

    #[test]
    fn blur_composite_matches() {
        let Some(gpu) = wgpu() else { return };
        let config = PipelineConfig {
            effect: Effect::Blur,
            zoom: 2,
            blur_radius: 4,
            blur_sigma: 2.0,
            refine_radius: 0,
            ..PipelineConfig::default()
        };
        assert_images_close(&composite(software(), &config), &composite(gpu, &config), 2);
    }

    #[test]
    fn label_overlay_matches() {
        let Some(gpu) = wgpu() else { return };
        let config = PipelineConfig {
            effect: Effect::Label,
            zoom: 1,
            color_map_alpha: 0.6,
            ..PipelineConfig::default()
        };
        assert_images_close(&composite(software(), &config), &composite(gpu, &config), 2);
    }
}
