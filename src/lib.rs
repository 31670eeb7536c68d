//! framepipe turns a stream of application-drawn frames into paced compositor presents.
//!
//! The pipeline has three cooperating parts:
//!
//! - a [`SceneBuilder`] that lowers nested transform, clip, opacity and frame scopes into a
//!   retained node tree plus deferred [`PaintTask`]s
//! - a [`SurfacePool`] that keeps rasterized surfaces alive across frames and recycles them
//! - a [`PresentScheduler`] that admits presents against the compositor's in-flight budget
//!
//! [`FramePipeline`] wires them together over any [`CompositorConnection`];
//! [`LoopbackCompositor`] is an in-process compositor for tests and demos.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Paced presentation: compositor protocol, scheduler and signals.
pub mod present;
/// Surface rasterization.
pub mod raster;
/// Scene building.
pub mod scene;
/// Retained surface cache.
pub mod surface;
/// End-to-end frame pipeline.
pub mod pipeline;

pub use crate::foundation::config::{
    PipelineConfig, PoolOpts, RasterOpts, SceneOpts, SchedulerOpts,
};
pub use crate::foundation::core::{
    Affine, BezPath, Color, ContentId, HostTime, PixelSize, Point, Rect, RoundedRect, Vec2,
};
pub use crate::foundation::error::{FramepipeError, FramepipeResult};

pub use crate::pipeline::{FramePipeline, FrameReport, PipelineSnapshot, PipelineStats};
pub use crate::present::compositor::{
    CommandBatch, CompositorConnection, CompositorEvent, FramePresentedInfo,
    FuturePresentationTimes, PresentReceivedInfo, PresentationInfo,
};
pub use crate::present::loopback::{LoopbackCompositor, LoopbackHandle};
pub use crate::present::scheduler::{Phase, PresentOutcome, PresentScheduler, SchedulerStats};
pub use crate::present::signal::{RasterFence, ReadySignal};
pub use crate::raster::{CpuRasterizer, RasterJob, RasterReport, Rasterizer};
pub use crate::scene::builder::{FrameSpec, SceneBuilder, ScopeToken};
pub use crate::scene::node::{SceneCommand, SceneGraph};
pub use crate::scene::paint::{DrawOp, PaintLayer, PaintTask};
pub use crate::surface::key::{RetentionKey, TransformFingerprint};
pub use crate::surface::pool::{Surface, SurfaceHandle, SurfaceId, SurfacePool, SurfacePoolStats};
