/// Per-frame scoped scene construction.
pub mod builder;
pub(crate) mod decompose;
/// Scene node arena and compositor commands.
pub mod node;
/// Drawable layers and paint tasks.
pub mod paint;
