use crate::foundation::config::PipelineConfig;
use crate::foundation::error::{FramepipeError, FramepipeResult};
use crate::present::compositor::{CompositorConnection, FramePresentedInfo};
use crate::present::scheduler::{PresentOutcome, PresentScheduler, SchedulerStats};
use crate::present::signal::{RasterFence, ReadySignal};
use crate::raster::{CpuRasterizer, RasterReport, Rasterizer, build_thread_pool, rasterize_tasks};
use crate::scene::builder::SceneBuilder;
use crate::surface::pool::{SurfacePool, SurfacePoolStats};
use std::time::Instant;

/// Counters kept by [`FramePipeline`] across frames.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    /// Frames handed to [`FramePipeline::submit_frame`].
    pub frames_submitted: u64,
    /// Surfaces repainted.
    pub surfaces_rasterized: u64,
    /// Surfaces shown from retained pixels.
    pub surfaces_reused: u64,
    /// Surfaces that failed to paint.
    pub raster_failures: u64,
    /// Surfaces destroyed by per-frame aging.
    pub surfaces_expired: u64,
    /// Surfaces destroyed by quiescent shrinking.
    pub surfaces_shrunk: u64,
}

/// Combined statistics snapshot, serializable for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PipelineSnapshot {
    /// Pipeline counters.
    pub pipeline: PipelineStats,
    /// Scheduler counters.
    pub scheduler: SchedulerStats,
    /// Pool counters.
    pub pool: SurfacePoolStats,
}

/// What happened to one submitted frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Zero-based frame number.
    pub frame: u64,
    /// Scheduler decision for the frame's present.
    pub outcome: PresentOutcome,
    /// Scene commands placed in the batch.
    pub commands: usize,
    /// Raster work done for the frame.
    pub raster: RasterReport,
    /// Surfaces destroyed by aging at the end of the frame.
    pub expired: usize,
}

/// End-to-end frame pipeline: scene building, retained surfaces, rasterization and paced
/// presentation over one compositor connection.
///
/// Per frame: [`begin_frame`](Self::begin_frame), describe the scene through the returned
/// builder, then [`submit_frame`](Self::submit_frame). Compositor events are fed in with
/// [`pump`](Self::pump); the [`ready_signal`](Self::ready_signal) tells the producer when
/// another frame is worth drawing.
pub struct FramePipeline<C: CompositorConnection> {
    config: PipelineConfig,
    scene: SceneBuilder,
    scheduler: PresentScheduler<C>,
    rasterizer: Box<dyn Rasterizer>,
    threads: Option<rayon::ThreadPool>,
    stats: PipelineStats,
    frame: u64,
}

impl<C: CompositorConnection> std::fmt::Debug for FramePipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("frame", &self.frame)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<C: CompositorConnection> FramePipeline<C> {
    /// Validate `config` and wire a pipeline onto `conn`.
    pub fn new(config: PipelineConfig, conn: C) -> FramepipeResult<Self> {
        config.validate()?;
        let threads = if config.raster.parallel {
            Some(build_thread_pool(config.raster.threads)?)
        } else {
            None
        };
        let pool = SurfacePool::new(config.pool.clone());
        let scene = SceneBuilder::new(config.scene.clone(), pool);
        let scheduler = PresentScheduler::new(conn, &config.scheduler, &config.debug_label);
        Ok(Self {
            config,
            scene,
            scheduler,
            rasterizer: Box::new(CpuRasterizer),
            threads,
            stats: PipelineStats::default(),
            frame: 0,
        })
    }

    /// Replace the rasterizer backend.
    pub fn with_rasterizer(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.rasterizer = Box::new(rasterizer);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a new frame and return the builder to describe it with.
    pub fn begin_frame(&mut self) -> &mut SceneBuilder {
        self.scene.begin_frame();
        &mut self.scene
    }

    /// Scene builder, for inspection between frames.
    pub fn scene(&self) -> &SceneBuilder {
        &self.scene
    }

    /// Mutable scene builder.
    pub fn scene_mut(&mut self) -> &mut SceneBuilder {
        &mut self.scene
    }

    /// Surface pool.
    pub fn pool(&self) -> &SurfacePool {
        self.scene.pool()
    }

    /// Presentation scheduler.
    pub fn scheduler(&self) -> &PresentScheduler<C> {
        &self.scheduler
    }

    /// Underlying compositor connection.
    pub fn connection(&self) -> &C {
        self.scheduler.connection()
    }

    /// Readiness signal raised whenever another frame can usefully be produced.
    pub fn ready_signal(&self) -> ReadySignal {
        self.scheduler.ready_signal()
    }

    /// Register a callback run for every frame-presented acknowledgment.
    pub fn on_frame_shown(&mut self, cb: impl FnMut(&FramePresentedInfo) + Send + 'static) {
        self.scheduler.on_frame_presented(cb);
    }

    /// Register a callback run once when the connection is lost.
    pub fn on_error(&mut self, cb: impl FnMut(&FramepipeError) + Send + 'static) {
        self.scheduler.on_error(cb);
    }

    /// Finish the frame being built: hand its commands to the scheduler, rasterize its
    /// surfaces and release the fence that gates its presentation.
    #[tracing::instrument(level = "debug", skip(self), fields(frame = self.frame))]
    pub fn submit_frame(&mut self) -> FramepipeResult<FrameReport> {
        let tasks = self.scene.end_frame()?;
        let commands = self.scene.graph().commands();
        let n_commands = commands.len();

        let fence = RasterFence::new();
        self.scheduler.enqueue(commands);
        self.scheduler.add_fence(fence.clone());
        let outcome = self.scheduler.request_present();

        let raster = rasterize_tasks(
            self.rasterizer.as_ref(),
            self.scene.pool_mut(),
            &tasks,
            self.threads.as_ref(),
        );
        fence.signal();
        let expired = self.scene.pool_mut().end_frame();

        self.stats.frames_submitted = self.stats.frames_submitted.saturating_add(1);
        self.stats.surfaces_rasterized = self
            .stats
            .surfaces_rasterized
            .saturating_add(raster.rasterized as u64);
        self.stats.surfaces_reused = self
            .stats
            .surfaces_reused
            .saturating_add(raster.reused as u64);
        self.stats.raster_failures = self
            .stats
            .raster_failures
            .saturating_add(raster.failed as u64);
        self.stats.surfaces_expired = self.stats.surfaces_expired.saturating_add(expired as u64);

        let report = FrameReport {
            frame: self.frame,
            outcome,
            commands: n_commands,
            raster,
            expired,
        };
        tracing::debug!(outcome = ?report.outcome, rasterized = report.raster.rasterized, "frame submitted");
        self.frame = self.frame.wrapping_add(1);
        Ok(report)
    }

    /// Drain pending compositor events into the scheduler, then shrink the pool if it has
    /// been quiet long enough. Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.scheduler.connection_mut().poll_event() {
            self.scheduler.handle_event(event);
            handled += 1;
        }
        if !self.scene.is_building() {
            let shrunk = self.scene.pool_mut().shrink_if_idle(Instant::now());
            self.stats.surfaces_shrunk = self.stats.surfaces_shrunk.saturating_add(shrunk as u64);
        }
        handled
    }

    /// Statistics from every stage.
    pub fn stats(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            pipeline: self.stats.clone(),
            scheduler: self.scheduler.stats(),
            pool: self.scene.pool().stats(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/pipeline/pipeline.rs"]
mod tests;
