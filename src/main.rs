use anyhow::{bail, Context, Result};
use clap::Parser;
use edgematte::capture::{CaptureSource, ImageFileSource};
use edgematte::gpu::{BackendKind, RenderContext};
use edgematte::output::{OutputSink, PngSink};
use edgematte::segmentation::{self, VOC_LABELS};
use edgematte::{Compositor, Effect, PipelineConfig};
use image::DynamicImage;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source image to composite
    #[arg(long)]
    image: Option<PathBuf>,

    /// Raw little-endian f32 class scores for the image
    #[arg(long)]
    scores: Option<PathBuf>,

    /// Score tensor shape as width,height,classes
    #[arg(long, value_delimiter = ',')]
    score_shape: Vec<usize>,

    /// Valid region of the score map as width,height (defaults to the full map)
    #[arg(long, value_delimiter = ',')]
    scaled_shape: Vec<usize>,

    /// Render backend (wgpu needs the `gpu` feature)
    #[arg(long, value_enum, default_value_t = BackendKind::Software)]
    backend: BackendKind,

    /// Background effect
    #[arg(long, value_enum, default_value_t = Effect::Blur)]
    effect: Effect,

    /// Output pixels per mask pixel
    #[arg(long, default_value_t = 1)]
    zoom: usize,

    /// Gaussian blur radius in output pixels
    #[arg(long, default_value_t = 30)]
    blur_radius: usize,

    /// Gaussian blur sigma
    #[arg(long, default_value_t = 30.0)]
    blur_sigma: f32,

    /// Edge refinement (guided filter) radius
    #[arg(long, default_value_t = 16)]
    refine_radius: usize,

    /// Guided filter regularization
    #[arg(long, default_value_t = 1e-6)]
    epsilon: f32,

    /// Fill color as r,g,b
    #[arg(long, value_delimiter = ',', default_value = "57,135,189")]
    bg_color: Vec<u8>,

    /// Label overlay opacity
    #[arg(long, default_value_t = 0.7)]
    alpha: f32,

    /// Class kept by the fill and blur effects
    #[arg(long, default_value_t = segmentation::PERSON_CLASS)]
    target_class: usize,

    /// Report the class under this output position (x,y)
    #[arg(long, value_delimiter = ',')]
    hover: Vec<f32>,

    /// Output image path, or v4l2loopback device in live mode
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file); enables live webcam mode
    #[arg(long)]
    model: Option<String>,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output resolution width in live mode
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height in live mode
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let fill_color = match self.bg_color.as_slice() {
            &[r, g, b] => [r, g, b],
            other => bail!("--bg-color needs 3 components, got {}", other.len()),
        };
        let config = PipelineConfig {
            effect: self.effect,
            zoom: self.zoom,
            blur_radius: self.blur_radius,
            blur_sigma: self.blur_sigma,
            refine_radius: self.refine_radius,
            epsilon: self.epsilon,
            fill_color,
            color_map_alpha: self.alpha,
            target_class: self.target_class,
        };
        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("edgematte starting");
    let config = args.pipeline_config()?;
    tracing::info!(
        "Effect: {}, zoom: {}, refine radius: {}",
        config.effect,
        config.zoom,
        config.refine_radius
    );

    if args.model.is_some() {
        run_live(&args, config)
    } else {
        run_still(&args, config)
    }
}

fn class_names(classes: usize) -> Vec<String> {
    if classes == VOC_LABELS.len() {
        VOC_LABELS.iter().map(|s| s.to_string()).collect()
    } else {
        (0..classes).map(|i| format!("class {i}")).collect()
    }
}

fn run_still(args: &Args, config: PipelineConfig) -> Result<()> {
    let image_path = args.image.as_ref().context("--image is required")?;
    let scores_path = args.scores.as_ref().context("--scores is required")?;
    let shape = match args.score_shape.as_slice() {
        &[w, h, c] => [w, h, c],
        _ => bail!("--score-shape needs width,height,classes"),
    };
    let scaled = match args.scaled_shape.as_slice() {
        &[] => [shape[0], shape[1]],
        &[w, h] => [w, h],
        _ => bail!("--scaled-shape needs width,height"),
    };

    let map = segmentation::load_raw_scores(scores_path, shape, scaled, class_names(shape[2]))?;
    let clipped = map.mask_extent();

    let mut source = ImageFileSource::open(image_path)?;
    let frame = source.capture_frame()?;

    let ctx = RenderContext::for_backend(args.backend).context("Failed to create render context")?;
    tracing::info!(backend = ctx.backend_name(), "render context ready");
    let mut compositor = Compositor::with_config(ctx, config.clone())?;
    compositor.upload_source(DynamicImage::ImageRgb8(frame).to_rgba8(), clipped)?;

    let mut pipeline = compositor.reconfigure(config)?;
    let elapsed = pipeline.draw(Some(map)).context("Failed to draw outputs")?;
    let (width, height) = pipeline.output_size()?;
    tracing::info!(
        "Rendered {}x{} in {:.2} ms",
        width,
        height,
        elapsed.as_secs_f64() * 1000.0
    );

    if compositor.config().effect == Effect::Label {
        for (class, entry) in compositor.legend() {
            tracing::info!(
                "Label {:>3}: {} rgb({}, {}, {})",
                class,
                entry.name,
                entry.rgb[0],
                entry.rgb[1],
                entry.rgb[2]
            );
        }
    }
    if let &[x, y] = args.hover.as_slice() {
        match compositor.hit_test(Some((x, y))) {
            Some(class) => tracing::info!("Class at ({}, {}): {}", x, y, class),
            None => tracing::info!("({}, {}) is outside the output", x, y),
        }
    }

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("edgematte.png"));
    let mut sink = PngSink::new(&path);
    sink.write_frame(&compositor.snapshot()?)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(not(all(feature = "webcam", feature = "onnx")))]
fn run_live(_args: &Args, _config: PipelineConfig) -> Result<()> {
    bail!("live mode requires building with --features webcam,onnx")
}

#[cfg(all(feature = "webcam", feature = "onnx"))]
fn run_live(args: &Args, mut config: PipelineConfig) -> Result<()> {
    use edgematte::capture::WebcamCapture;
    use edgematte::output::V4L2Output;

    let model_path = args.model.as_deref().context("--model is required")?;
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    // Initialize capture
    let mut capture =
        WebcamCapture::new(args.input_device).context("Failed to initialize webcam capture")?;

    // Initialize output
    let device = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("/dev/video10"));
    let mut output = V4L2Output::new(&device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    tracing::info!("Loading segmentation model from {}", model_path);
    let mut model = segmentation::create_default_model(model_path)
        .context("Failed to load segmentation model")?;
    config.target_class = model.target_class();

    let ctx = RenderContext::for_backend(args.backend).context("Failed to create render context")?;
    tracing::info!(backend = ctx.backend_name(), "render context ready");
    let mut compositor = Compositor::with_config(ctx, config)?;
    compositor.setup()?;

    live::run_pipeline(&mut capture, &mut output, model.as_mut(), &mut compositor, args.fps)
}

#[cfg(all(feature = "webcam", feature = "onnx"))]
mod live {
    use anyhow::{Context, Result};
    use edgematte::capture::CaptureSource;
    use edgematte::output::OutputSink;
    use edgematte::segmentation::SegmentationModel;
    use edgematte::Compositor;
    use image::DynamicImage;
    use std::time::{Duration, Instant};

    pub fn run_pipeline<C, O>(
        capture: &mut C,
        output: &mut O,
        model: &mut dyn SegmentationModel,
        compositor: &mut Compositor,
        target_fps: u32,
    ) -> Result<()>
    where
        C: CaptureSource,
        O: OutputSink,
    {
        let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
        let mut frame_count = 0u64;
        let mut total_capture_time = Duration::ZERO;
        let mut total_segment_time = Duration::ZERO;
        let mut total_composite_time = Duration::ZERO;
        let mut total_output_time = Duration::ZERO;

        tracing::info!("Starting main pipeline loop");
        tracing::info!("Press Ctrl+C to stop");

        loop {
            let loop_start = Instant::now();

            // Capture frame
            let capture_start = Instant::now();
            let frame = capture
                .capture_frame()
                .context("Failed to capture frame")?;
            total_capture_time += capture_start.elapsed();

            // Segmentation
            let segment_start = Instant::now();
            let scores = model.segment(&frame).context("Failed to segment frame")?;
            total_segment_time += segment_start.elapsed();

            // Composite
            let composite_start = Instant::now();
            compositor.upload_source(DynamicImage::ImageRgb8(frame).to_rgba8(), scores.mask_extent())?;
            compositor
                .draw_outputs(Some(scores))
                .context("Failed to composite frame")?;
            let composited = compositor.snapshot()?;
            total_composite_time += composite_start.elapsed();

            // Output frame
            let output_start = Instant::now();
            output
                .write_frame(&composited)
                .context("Failed to write frame")?;
            total_output_time += output_start.elapsed();

            frame_count += 1;

            // Log stats every 30 frames
            if frame_count % 30 == 0 {
                let avg = |d: Duration| d.as_secs_f64() * 1000.0 / frame_count as f64;
                let (capture_ms, segment_ms, composite_ms, output_ms) = (
                    avg(total_capture_time),
                    avg(total_segment_time),
                    avg(total_composite_time),
                    avg(total_output_time),
                );
                let total_ms = capture_ms + segment_ms + composite_ms + output_ms;
                tracing::info!(
                    "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                    frame_count,
                    capture_ms,
                    segment_ms,
                    composite_ms,
                    output_ms,
                    total_ms,
                    1000.0 / total_ms
                );
            }

            // Frame rate limiting
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }
}
