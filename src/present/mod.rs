/// Compositor capability and protocol records.
pub mod compositor;
/// In-process compositor used by tests and the demo driver.
pub mod loopback;
/// Admission-controlled presentation state machine.
pub mod scheduler;
/// Readiness signal and raster fences.
pub mod signal;
/// Presentation time prediction.
pub mod vsync;
