use std::collections::HashMap;

use bevy::{
    asset::{AssetId, Assets, Handle},
    pbr::StandardMaterial,
    prelude::{Asset, Entity, Mesh, Resource},
    reflect::TypePath,
};
use bevy_log::{debug, info};

use crate::{
    error::MeshTextError,
    glyph::GlyphSet,
    layout::FontMetrics,
    pool::{InstanceHost, InstancePool, PoolSettings},
    registry::GlyphRegistry,
};

/// A font made of authored glyph meshes.
///
/// Glyph sets are listed in priority order: when two sets define the same
/// key the earlier set wins.
#[derive(Asset, TypePath, Clone, Debug)]
pub struct GlyphFont {
    pub metrics: FontMetrics,
    pub glyph_sets: Vec<GlyphSet>,
    /// Shared material for every glyph instance of this font.
    pub material: Handle<StandardMaterial>,
    pub cast_shadows: bool,
}

impl GlyphFont {
    pub fn new(glyph_sets: Vec<GlyphSet>, material: Handle<StandardMaterial>) -> Self {
        Self {
            metrics: FontMetrics::default(),
            glyph_sets,
            material,
            cast_shadows: false,
        }
    }

    pub fn with_metrics(mut self, metrics: FontMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether every glyph mesh of the font is available in `meshes`.
    pub fn is_loaded(&self, meshes: &Assets<Mesh>) -> bool {
        self.glyph_sets.iter().all(|set| set.is_loaded(meshes))
    }
}

/// Runtime state of one font: its metrics, glyph registry and instance pool.
/// Texts sharing a font share this context.
#[derive(Debug)]
pub struct FontContext<T> {
    pub metrics: FontMetrics,
    pub material: Handle<StandardMaterial>,
    pub cast_shadows: bool,
    pub registry: GlyphRegistry,
    pub pool: InstancePool<T>,
}

impl<T: Copy + Eq + std::fmt::Debug> FontContext<T> {
    pub fn new(
        metrics: FontMetrics,
        material: Handle<StandardMaterial>,
        registry: GlyphRegistry,
        pool: PoolSettings,
    ) -> Self {
        Self {
            metrics,
            material,
            cast_shadows: false,
            registry,
            pool: InstancePool::new(pool),
        }
    }

    /// Measure the font's glyph meshes and build its registry.
    pub fn from_font(
        font: &GlyphFont,
        meshes: &Assets<Mesh>,
        pool: PoolSettings,
    ) -> Result<Self, MeshTextError> {
        let registry = GlyphRegistry::from_sets(&font.glyph_sets, meshes)?;
        let mut context = Self::new(font.metrics.clone(), font.material.clone(), registry, pool);
        context.cast_shadows = font.cast_shadows;
        Ok(context)
    }

    /// Destroy the idle instances, then drop the glyph records. Every text
    /// using this context must have released its instances beforehand.
    pub fn teardown<H>(&mut self, host: &mut H)
    where
        H: InstanceHost<Instance = T>,
    {
        self.pool.clear(host);
        self.registry.teardown();
    }
}

/// Font contexts keyed by font asset, built the first time a text needs
/// them and all of their glyph meshes are loaded.
#[derive(Debug, Default, Resource)]
pub struct GlyphFontContexts {
    pub(crate) contexts: HashMap<AssetId<GlyphFont>, FontContext<Entity>>,
}

impl GlyphFontContexts {
    pub fn get(
        &self,
        id: impl Into<AssetId<GlyphFont>>,
    ) -> Option<&FontContext<Entity>> {
        self.contexts.get(&id.into())
    }

    pub fn get_mut(
        &mut self,
        id: impl Into<AssetId<GlyphFont>>,
    ) -> Option<&mut FontContext<Entity>> {
        self.contexts.get_mut(&id.into())
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Build the context for `id` if it does not exist yet. Returns whether
    /// the context is available.
    pub fn ensure(
        &mut self,
        id: AssetId<GlyphFont>,
        fonts: &Assets<GlyphFont>,
        meshes: &Assets<Mesh>,
        pool: PoolSettings,
    ) -> bool {
        if self.contexts.contains_key(&id) {
            return true;
        }
        let Some(font) = fonts.get(id) else {
            debug!("Glyph font {:?} not loaded yet. Will try again next frame.", id);
            return false;
        };
        if !font.is_loaded(meshes) {
            debug!(
                "Glyph meshes of font {:?} not loaded yet. Will try again next frame.",
                id
            );
            return false;
        }
        match FontContext::from_font(font, meshes, pool) {
            Ok(context) => {
                info!(
                    "Created font context {:?} with {} glyphs",
                    id,
                    context.registry.len()
                );
                self.contexts.insert(id, context);
                true
            }
            Err(err) => {
                debug!("Font context {:?} not ready: {err}", id);
                false
            }
        }
    }

    pub(crate) fn drain(
        &mut self,
    ) -> impl Iterator<Item = (AssetId<GlyphFont>, FontContext<Entity>)> + '_ {
        self.contexts.drain()
    }
}
