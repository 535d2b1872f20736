use std::collections::HashMap;

use bevy::{asset::Assets, prelude::Mesh};
use bevy_log::{debug, info, warn};

use crate::{
    error::MeshTextError,
    glyph::{GlyphKey, GlyphRecord, GlyphSet},
};

/// Maps glyph keys to their records for one font context.
///
/// When several sources define the same key, the first source in
/// declaration order wins and later duplicates are ignored.
#[derive(Debug, Default)]
pub struct GlyphRegistry {
    glyphs: HashMap<GlyphKey, GlyphRecord>,
}

impl GlyphRegistry {
    /// Merge record sources in order, keeping the first record per key.
    pub fn build<S, R>(sources: S) -> Self
    where
        S: IntoIterator<Item = R>,
        R: IntoIterator<Item = GlyphRecord>,
    {
        let mut glyphs: HashMap<GlyphKey, GlyphRecord> = HashMap::new();
        for source in sources {
            for record in source {
                if glyphs.contains_key(record.key()) {
                    debug!(
                        "Glyph \"{}\" already registered by an earlier set; ignoring duplicate",
                        record.key()
                    );
                    continue;
                }
                glyphs.insert(record.key().clone(), record);
            }
        }
        Self { glyphs }
    }

    /// Measure every glyph mesh of `sets` and build the registry from them.
    pub fn from_sets(sets: &[GlyphSet], meshes: &Assets<Mesh>) -> Result<Self, MeshTextError> {
        for source in sets.iter().flat_map(|set| set.glyphs.iter()) {
            if source.requires_key_override() && !source.override_key {
                warn!(
                    "Glyph mesh \"{}\" has an ambiguous name; give it an explicit key",
                    source.name
                );
            }
        }
        let records = sets
            .iter()
            .map(|set| set.records(meshes))
            .collect::<Result<Vec<_>, _>>()?;
        let registry = Self::build(records);
        info!(
            "Built glyph registry with {} glyphs from {} sets",
            registry.len(),
            sets.len()
        );
        Ok(registry)
    }

    pub fn lookup(&self, key: &str) -> Option<&GlyphRecord> {
        self.glyphs.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.glyphs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &GlyphKey> {
        self.glyphs.keys()
    }

    /// Drop every record and the mesh handles they retain. Idempotent.
    pub fn teardown(&mut self) {
        if !self.glyphs.is_empty() {
            debug!("Tearing down glyph registry ({} glyphs)", self.glyphs.len());
        }
        self.glyphs.clear();
    }
}
