use std::{borrow::Borrow, fmt};

use bevy::{
    asset::{Assets, Handle},
    math::Vec3,
    prelude::Mesh,
};
use bevy_camera::primitives::Aabb;
use bevy_log::debug;
use bevy_mesh::VertexAttributeValues;

use crate::error::MeshTextError;

/// Identifier used to look up a mesh-backed character: either a single
/// character (`"A"`) or a bracket-delimited token (`"[WALK]"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlyphKey(String);

impl GlyphKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for keys of the form `[KEY]` with a non-empty `KEY`.
    pub fn is_bracketed(&self) -> bool {
        is_bracketed(&self.0)
    }
}

impl From<&str> for GlyphKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for GlyphKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<char> for GlyphKey {
    fn from(value: char) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for GlyphKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GlyphKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_bracketed(name: &str) -> bool {
    name.chars().count() > 2 && name.starts_with('[') && name.ends_with(']')
}

/// An immutable mesh-backed glyph: the mesh handle plus the bounds measured
/// once from the mesh geometry.
#[derive(Clone, Debug)]
pub struct GlyphRecord {
    key: GlyphKey,
    mesh: Handle<Mesh>,
    bounds: Aabb,
}

impl GlyphRecord {
    pub fn new(key: impl Into<GlyphKey>, mesh: Handle<Mesh>, bounds: Aabb) -> Self {
        Self {
            key: key.into(),
            mesh,
            bounds,
        }
    }

    /// Measure `mesh` and build a record for it.
    pub fn from_mesh(key: impl Into<GlyphKey>, handle: Handle<Mesh>, mesh: &Mesh) -> Self {
        Self::new(key, handle, mesh_bounds(mesh))
    }

    pub fn key(&self) -> &GlyphKey {
        &self.key
    }

    pub fn mesh(&self) -> &Handle<Mesh> {
        &self.mesh
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Full size of the bounding box.
    pub fn size(&self) -> Vec3 {
        Vec3::from(self.bounds.half_extents) * 2.0
    }

    /// Half size of the bounding box.
    pub fn extents(&self) -> Vec3 {
        Vec3::from(self.bounds.half_extents)
    }

    /// Horizontal extent used by proportional layout.
    pub fn width(&self) -> f32 {
        self.size().x
    }
}

/// Compute the axis-aligned bounds of a mesh from its position attribute.
/// Meshes without positions measure as an empty box at the origin.
pub fn mesh_bounds(mesh: &Mesh) -> Aabb {
    let Some(VertexAttributeValues::Float32x3(positions)) =
        mesh.attribute(Mesh::ATTRIBUTE_POSITION)
    else {
        debug!("Mesh has no Float32x3 positions; using empty bounds");
        return Aabb::from_min_max(Vec3::ZERO, Vec3::ZERO);
    };

    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for p in positions {
        let p = Vec3::from_array(*p);
        min = min.min(p);
        max = max.max(p);
    }

    if positions.is_empty() {
        Aabb::from_min_max(Vec3::ZERO, Vec3::ZERO)
    } else {
        Aabb::from_min_max(min, max)
    }
}

/// One authored glyph: a mesh, the mesh's name, and an optional explicit key.
///
/// The key defaults to the mesh name. Names longer than one character that
/// are not bracket-delimited (`"letter_a"`) are ambiguous as keys, so such
/// sources are expected to carry an override.
#[derive(Clone, Debug)]
pub struct GlyphSource {
    pub mesh: Handle<Mesh>,
    pub name: String,
    pub override_key: bool,
    pub custom_key: String,
}

impl GlyphSource {
    pub fn new(mesh: Handle<Mesh>, name: impl Into<String>) -> Self {
        Self {
            mesh,
            name: name.into(),
            override_key: false,
            custom_key: String::new(),
        }
    }

    /// Use `key` instead of the mesh name.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.override_key = true;
        self.custom_key = key.into();
        self
    }

    pub fn key(&self) -> GlyphKey {
        if self.override_key {
            GlyphKey::new(self.custom_key.clone())
        } else {
            GlyphKey::new(self.name.clone())
        }
    }

    /// Whether the mesh name is too ambiguous to serve as the key on its own.
    pub fn requires_key_override(&self) -> bool {
        self.name.chars().count() > 1 && !is_bracketed(&self.name)
    }
}

/// An ordered collection of glyph sources. Earlier sets take priority when
/// several sets define the same key.
#[derive(Clone, Debug, Default)]
pub struct GlyphSet {
    pub name: String,
    pub glyphs: Vec<GlyphSource>,
}

impl GlyphSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            glyphs: Vec::new(),
        }
    }

    pub fn with_glyph(mut self, glyph: GlyphSource) -> Self {
        self.glyphs.push(glyph);
        self
    }

    /// Whether every mesh in the set is available in `meshes`.
    pub fn is_loaded(&self, meshes: &Assets<Mesh>) -> bool {
        self.glyphs.iter().all(|g| meshes.get(&g.mesh).is_some())
    }

    /// Resolve every source into a measured record, in declaration order.
    pub fn records(&self, meshes: &Assets<Mesh>) -> Result<Vec<GlyphRecord>, MeshTextError> {
        self.glyphs
            .iter()
            .map(|source| {
                let key = source.key();
                let mesh = meshes
                    .get(&source.mesh)
                    .ok_or_else(|| MeshTextError::MeshNotLoaded {
                        key: key.to_string(),
                    })?;
                Ok(GlyphRecord::from_mesh(key, source.mesh.clone(), mesh))
            })
            .collect()
    }
}
