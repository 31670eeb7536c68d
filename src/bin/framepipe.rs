use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use framepipe::{
    Affine, Color, ContentId, DrawOp, FramePipeline, FrameSpec, LoopbackCompositor, PaintLayer,
    PipelineConfig, PresentOutcome, Rect, RoundedRect,
};

#[derive(Parser, Debug)]
#[command(name = "framepipe", version)]
struct Cli {
    /// Frames to produce.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Presents the loopback compositor allows in flight.
    #[arg(long, default_value_t = 2)]
    budget: u32,

    /// Pipeline configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log pipeline decisions to stderr.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => PipelineConfig::default(),
    };
    if cli.budget == 0 {
        anyhow::bail!("--budget must be >= 1");
    }

    let (conn, compositor) = LoopbackCompositor::new(cli.budget);
    let mut pipeline = FramePipeline::new(config, conn).context("create frame pipeline")?;
    let ready = pipeline.ready_signal();
    pipeline.pump();

    let mut deferred = 0u64;
    for frame in 0..cli.frames {
        draw_scene(&mut pipeline, frame).with_context(|| format!("build frame {frame}"))?;
        let report = pipeline
            .submit_frame()
            .with_context(|| format!("submit frame {frame}"))?;
        match report.outcome {
            PresentOutcome::Deferred => deferred += 1,
            PresentOutcome::Dropped => anyhow::bail!("compositor connection lost at frame {frame}"),
            PresentOutcome::Transmitted => {}
        }
        pipeline.pump();

        // Present one frame per tick; keep presenting while the producer is throttled.
        compositor.present_all();
        pipeline.pump();
        while !ready.is_raised() && !ready.is_closed() && compositor.outstanding() > 0 {
            compositor.present_all();
            pipeline.pump();
        }
    }
    while compositor.outstanding() > 0 {
        compositor.present_all();
        pipeline.pump();
    }

    let mut stats = serde_json::to_value(pipeline.stats()).context("serialize stats")?;
    stats["deferred_frames"] = serde_json::json!(deferred);
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("format stats")?
    );
    Ok(())
}

// A static backdrop, a panel that slides horizontally, and a badge that only changes every
// 30 frames.
fn draw_scene(
    pipeline: &mut FramePipeline<LoopbackCompositor>,
    frame: u64,
) -> framepipe::FramepipeResult<()> {
    let b = pipeline.begin_frame();

    let backdrop = b.push_frame(
        FrameSpec::new(
            RoundedRect::new(0.0, 0.0, 320.0, 240.0, 0.0),
            Color::rgba(24, 24, 32, 255),
        )
        .label("backdrop")
        .owner(ContentId(1))
        .content_unchanged(frame > 0),
    )?;
    b.add_paint_layer(PaintLayer::new(vec![DrawOp::FillRect {
        rect: Rect::new(0.0, 200.0, 320.0, 240.0),
        color: Color::rgba(48, 48, 64, 255),
    }]))?;
    b.pop(backdrop)?;

    let x = (frame % 120) as f64 * 2.0;
    let slide = b.push_transform(Affine::translate((x, 40.0)))?;
    let panel = b.push_frame(
        FrameSpec::new(
            RoundedRect::new(0.0, 0.0, 80.0, 60.0, 8.0),
            Color::rgba(200, 80, 40, 255),
        )
        .label("panel")
        .owner(ContentId(2))
        .opacity(220)
        .elevated()
        .content_unchanged(frame > 0),
    )?;
    b.add_paint_layer(PaintLayer::new(vec![DrawOp::FillRoundedRect {
        rrect: RoundedRect::new(8.0, 8.0, 72.0, 52.0, 4.0),
        color: Color::WHITE,
    }]))?;
    b.pop(panel)?;
    b.pop(slide)?;

    let badge_clip = b.push_clip(Rect::new(260.0, 10.0, 310.0, 40.0))?;
    let badge = b.push_frame(
        FrameSpec::new(
            RoundedRect::new(260.0, 10.0, 310.0, 40.0, 15.0),
            Color::rgba(40, 160, 90, 255),
        )
        .label("badge")
        .owner(ContentId(3))
        .elevated()
        .content_unchanged(frame % 30 != 0),
    )?;
    let level = ((frame / 30) % 5) as f64 * 10.0;
    b.add_paint_layer(PaintLayer::new(vec![DrawOp::FillRect {
        rect: Rect::new(265.0, 30.0, 265.0 + level.max(1.0), 35.0),
        color: Color::WHITE,
    }]))?;
    b.pop(badge)?;
    b.pop(badge_clip)?;
    Ok(())
}
