use crate::foundation::error::{FramepipeError, FramepipeResult};
use std::path::Path;

/// Presentation scheduler options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerOpts {
    /// Hard cap on presents transmitted but not yet acknowledged.
    pub max_frames_in_flight: u32,
    /// Window (milliseconds) of future presentation times requested at handshake.
    pub prediction_window_ms: u64,
    /// Presentation interval assumed until the compositor provides predictions.
    pub default_present_interval_ns: u64,
}

impl Default for SchedulerOpts {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 3,
            prediction_window_ms: 0,
            default_present_interval_ns: 16_666_667,
        }
    }
}

/// Surface pool options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolOpts {
    /// Frames a surface may stay unacquired before it is destroyed.
    pub max_surface_age: u32,
    /// Maximum bytes of backing storage held across all surfaces.
    pub max_pool_bytes: usize,
    /// Quiet period (milliseconds) without acquisitions that triggers shrink-to-fit.
    pub shrink_after_ms: u64,
    /// Minimum age before an idle surface may be repurposed under a new key.
    ///
    /// Zero lets a surface released last frame be recycled immediately, which may overwrite
    /// pixels the compositor still displays.
    pub min_repurpose_age: u32,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            max_surface_age: 3,
            max_pool_bytes: 256 * 1024 * 1024,
            shrink_after_ms: 167,
            min_repurpose_age: 1,
        }
    }
}

/// Scene building options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneOpts {
    /// Depth offset between sibling subtrees that request separation.
    pub elevation_step: f32,
    /// Logical-to-physical pixel ratio applied on top of the composed transform scale.
    pub device_scale: f64,
}

impl Default for SceneOpts {
    fn default() -> Self {
        Self {
            elevation_step: 10.0,
            device_scale: 1.0,
        }
    }
}

/// Rasterization options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RasterOpts {
    /// Rasterize a frame's paint tasks in parallel.
    pub parallel: bool,
    /// Worker threads for parallel rasterization. `None` uses rayon defaults.
    pub threads: Option<usize>,
}

impl Default for RasterOpts {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
        }
    }
}

/// Full pipeline configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Name forwarded to the compositor for diagnostics.
    pub debug_label: String,
    /// Scheduler section.
    pub scheduler: SchedulerOpts,
    /// Pool section.
    pub pool: PoolOpts,
    /// Scene section.
    pub scene: SceneOpts,
    /// Raster section.
    pub raster: RasterOpts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debug_label: "framepipe".to_owned(),
            scheduler: SchedulerOpts::default(),
            pool: PoolOpts::default(),
            scene: SceneOpts::default(),
            raster: RasterOpts::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(s: &str) -> FramepipeResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| FramepipeError::serde(format!("parse pipeline config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> FramepipeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FramepipeError::Other(anyhow::Error::new(e).context(format!(
                "read pipeline config '{}'",
                path.display()
            )))
        })?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> FramepipeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FramepipeError::serde(format!("serialize pipeline config: {e}")))
    }

    /// Check value ranges.
    pub fn validate(&self) -> FramepipeResult<()> {
        if self.scheduler.max_frames_in_flight == 0 {
            return Err(FramepipeError::config(
                "scheduler.max_frames_in_flight must be >= 1",
            ));
        }
        if self.scheduler.default_present_interval_ns == 0 {
            return Err(FramepipeError::config(
                "scheduler.default_present_interval_ns must be > 0",
            ));
        }
        if self.pool.max_surface_age == 0 {
            return Err(FramepipeError::config("pool.max_surface_age must be >= 1"));
        }
        if !self.scene.elevation_step.is_finite() || self.scene.elevation_step <= 0.0 {
            return Err(FramepipeError::config(
                "scene.elevation_step must be finite and > 0",
            ));
        }
        if !self.scene.device_scale.is_finite() || self.scene.device_scale <= 0.0 {
            return Err(FramepipeError::config(
                "scene.device_scale must be finite and > 0",
            ));
        }
        if self.raster.threads == Some(0) {
            return Err(FramepipeError::config(
                "raster.threads must be >= 1 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
