use thiserror::Error;

use crate::pool::InstanceId;

/// Errors surfaced to callers of the text pipeline.
///
/// Missing glyphs and malformed escapes are not errors: they are logged and
/// the affected characters degrade to zero width.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshTextError {
    /// Bounds or size were requested while the session holds no text.
    #[error("mesh text is empty; bounds and size are only defined for populated text")]
    EmptyText,
    /// A layout recompute was requested before any text was set.
    #[error("mesh text has no populated layout to recompute")]
    NotPopulated,
    /// The pool does not own a live instance with this id.
    #[error("instance {0:?} is not checked out from this pool")]
    UnknownInstance(InstanceId),
    /// A glyph source references a mesh that is not (yet) in `Assets<Mesh>`.
    #[error("mesh for glyph \"{key}\" is not loaded")]
    MeshNotLoaded { key: String },
}
