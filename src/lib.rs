pub mod bounds;
pub mod error;
pub mod font;
pub mod glyph;
pub mod host;
pub mod layout;
pub mod pool;
pub mod registry;
pub mod session;
mod text;
pub mod tokenizer;

pub use error::MeshTextError;
pub use font::{FontContext, GlyphFont, GlyphFontContexts};
pub use glyph::{GlyphKey, GlyphRecord, GlyphSet, GlyphSource};
pub use host::{GlyphInstance, WorldInstanceHost};
pub use layout::{
    FontMetrics, HorizontalAlignment, LayoutResult, LayoutSettings, VerticalAlignment,
    compute_positions, layout_text,
};
pub use pool::{InstanceHost, InstanceId, InstancePool, PoolSettings, PoolStats};
pub use registry::GlyphRegistry;
pub use session::{SessionState, TextOptions, TextSession};
pub use text::{
    MeshText, MeshTextCleared, MeshTextPlugin, MeshTextPluginConfig, MeshTextReady,
    MeshTextSessions, sync_mesh_text_system, teardown_mesh_text,
};
pub use tokenizer::{Token, TokenizedText, tokenize};
