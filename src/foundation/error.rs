/// Convenience result type used across framepipe.
pub type FramepipeResult<T> = Result<T, FramepipeError>;

/// Top-level error taxonomy for recoverable failures.
///
/// Protocol invariant violations (a negative in-flight count, a zero starting budget) are
/// not represented here: they abort via panic because the compositor connection is no
/// longer in a usable state.
#[derive(thiserror::Error, Debug)]
pub enum FramepipeError {
    /// Invalid caller-provided data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Scene traversal scopes were pushed/popped out of order.
    #[error("scope error: {0}")]
    Scope(String),

    /// Rasterization backend failure.
    #[error("raster error: {0}")]
    Raster(String),

    /// The compositor connection was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// Invalid pipeline configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramepipeError {
    /// Build a [`FramepipeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FramepipeError::Scope`] value.
    pub fn scope(msg: impl Into<String>) -> Self {
        Self::Scope(msg.into())
    }

    /// Build a [`FramepipeError::Raster`] value.
    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    /// Build a [`FramepipeError::Connection`] value.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Build a [`FramepipeError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`FramepipeError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
