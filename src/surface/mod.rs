/// Retention keys and transform fingerprints.
pub mod key;
/// Retained surface cache.
pub mod pool;
