use crate::foundation::core::{Affine, Color, Rect};
use crate::foundation::error::{FramepipeError, FramepipeResult};
use crate::scene::paint::{DrawOp, PaintLayer, PaintTask};
use crate::surface::pool::{Surface, SurfacePool};
use kurbo::{PathEl, Shape};
use rayon::prelude::*;

/// One surface's worth of drawing.
#[derive(Clone, Copy, Debug)]
pub struct RasterJob<'a> {
    /// Layers in paint order.
    pub layers: &'a [PaintLayer],
    /// Color the surface is cleared to first.
    pub clear: Color,
    /// Logical-to-pixel transform.
    pub transform: Affine,
}

impl<'a> RasterJob<'a> {
    /// Job for a paint task: scale, then move the frame origin to pixel (0, 0).
    pub fn for_task(task: &'a PaintTask) -> Self {
        Self {
            layers: &task.layers,
            clear: task.background,
            transform: Affine::scale_non_uniform(task.scale.x, task.scale.y)
                * Affine::translate(-task.origin.to_vec2()),
        }
    }
}

/// Backend that fills a surface with pixels.
pub trait Rasterizer: Send + Sync {
    /// Clear `surface` to `job.clear` and paint `job.layers` into it.
    fn rasterize_into(&self, surface: &mut Surface, job: &RasterJob<'_>) -> FramepipeResult<()>;
}

/// CPU rasterizer backed by `vello_cpu`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuRasterizer;

impl Rasterizer for CpuRasterizer {
    fn rasterize_into(&self, surface: &mut Surface, job: &RasterJob<'_>) -> FramepipeResult<()> {
        let size = surface.size();
        let w: u16 = size
            .width
            .try_into()
            .map_err(|_| FramepipeError::raster(format!("surface width exceeds u16: {}", size.width)))?;
        let h: u16 = size.height.try_into().map_err(|_| {
            FramepipeError::raster(format!("surface height exceeds u16: {}", size.height))
        })?;

        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(color_to_cpu(job.clear));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(w), f64::from(h)));

        ctx.set_transform(affine_to_cpu(job.transform));
        for layer in job.layers {
            for op in layer.ops.iter() {
                match op {
                    DrawOp::FillRect { rect, color } => {
                        ctx.set_paint(color_to_cpu(*color));
                        ctx.fill_rect(&rect_to_cpu(*rect));
                    }
                    DrawOp::FillRoundedRect { rrect, color } => {
                        ctx.set_paint(color_to_cpu(*color));
                        ctx.fill_path(&path_to_cpu(rrect.path_elements(0.1)));
                    }
                    DrawOp::FillPath { path, color } => {
                        ctx.set_paint(color_to_cpu(*color));
                        ctx.fill_path(&path_to_cpu(path.elements().iter().copied()));
                    }
                }
            }
        }

        let pixmap = surface.pixmap_mut();
        pixmap.data_as_u8_slice_mut().fill(0);
        ctx.flush();
        ctx.render_to_pixmap(pixmap);
        Ok(())
    }
}

/// Outcome of rasterizing one frame's paint tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RasterReport {
    /// Surfaces repainted.
    pub rasterized: usize,
    /// Surfaces whose retained pixels were reused.
    pub reused: usize,
    /// Surfaces that could not be painted; their contents are invalid.
    pub failed: usize,
}

/// Paint every task that needs it, optionally fanning out over `threads`.
///
/// Surfaces are checked out of `pool` for the duration and checked back in afterwards. A
/// failed task is logged and leaves its surface marked invalid.
#[tracing::instrument(level = "debug", skip_all, fields(tasks = tasks.len()))]
pub fn rasterize_tasks(
    rasterizer: &dyn Rasterizer,
    pool: &mut SurfacePool,
    tasks: &[PaintTask],
    threads: Option<&rayon::ThreadPool>,
) -> RasterReport {
    let mut report = RasterReport::default();
    let mut jobs = Vec::with_capacity(tasks.len());
    for task in tasks {
        if !task.needs_raster() {
            report.reused += 1;
            continue;
        }
        match pool.checkout(&task.surface) {
            Some(surface) => jobs.push((task, surface)),
            None => {
                tracing::warn!(id = task.surface.id().0, "paint task surface unavailable");
                report.failed += 1;
            }
        }
    }

    let run = |(task, mut surface): (&PaintTask, Surface)| {
        let res = rasterizer.rasterize_into(&mut surface, &RasterJob::for_task(task));
        (surface, res)
    };
    let results: Vec<(Surface, FramepipeResult<()>)> = match threads {
        Some(tp) => tp.install(|| jobs.into_par_iter().map(run).collect()),
        None => jobs.into_iter().map(run).collect(),
    };

    for (surface, res) in results {
        match res {
            Ok(()) => {
                pool.checkin(surface, true);
                report.rasterized += 1;
            }
            Err(e) => {
                tracing::warn!(id = surface.id().0, error = %e, "rasterization failed");
                pool.checkin(surface, false);
                report.failed += 1;
            }
        }
    }
    report
}

/// Dedicated rayon pool for raster work.
pub(crate) fn build_thread_pool(threads: Option<usize>) -> FramepipeResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(FramepipeError::validation(
            "raster threads must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("framepipe-raster-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| FramepipeError::raster(format!("failed to build rayon thread pool: {e}")))
}

fn color_to_cpu(c: Color) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn rect_to_cpu(r: Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

fn path_to_cpu(els: impl IntoIterator<Item = PathEl>) -> vello_cpu::kurbo::BezPath {
    let pt = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for el in els {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
#[path = "../tests/unit/raster/raster.rs"]
mod tests;
