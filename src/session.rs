use bevy::{asset::Handle, math::Vec3, pbr::StandardMaterial, prelude::Transform};
use bevy_camera::primitives::Aabb;
use bevy_log::{debug, warn};

use crate::{
    bounds::union_bounds,
    error::MeshTextError,
    font::FontContext,
    glyph::GlyphRecord,
    layout::{
        HorizontalAlignment, LayoutResult, LayoutSettings, VerticalAlignment, compute_positions,
    },
    pool::{InstanceHost, InstanceId, InstancePool},
    tokenizer::TokenizedText,
};

/// Per-text layout and rendering options.
#[derive(Clone, Debug, PartialEq)]
pub struct TextOptions {
    pub horizontal_alignment: HorizontalAlignment,
    pub vertical_alignment: VerticalAlignment,
    pub size_multiplier: f32,
    pub monospaced: bool,
    /// Release every instance before laying out new text. When disabled,
    /// instances are kept for character slots whose glyph did not change.
    pub auto_clear: bool,
    pub visible: bool,
    /// Overrides the font's shared material.
    pub material: Option<Handle<StandardMaterial>>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            horizontal_alignment: HorizontalAlignment::Leading,
            vertical_alignment: VerticalAlignment::Bottom,
            size_multiplier: 1.0,
            monospaced: false,
            auto_clear: true,
            visible: true,
            material: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Empty,
    Populated,
}

/// One composed text: its buffer, layout and the instances checked out for
/// it, index-aligned with the characters of the text.
#[derive(Debug, Default)]
pub struct TextSession {
    text: String,
    options: TextOptions,
    tokens: TokenizedText,
    layout: Option<LayoutResult>,
    slots: Vec<Option<InstanceId>>,
    state: SessionState,
}

impl TextSession {
    pub fn new(options: TextOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    /// Replace the options. Call [`TextSession::recompute_layout`] afterwards
    /// for layout changes to reach the instances.
    pub fn set_options(&mut self, options: TextOptions) {
        self.options = options;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_populated(&self) -> bool {
        self.state == SessionState::Populated
    }

    pub fn layout(&self) -> Option<&LayoutResult> {
        self.layout.as_ref()
    }

    /// Instance per character slot; `None` where no glyph is shown.
    pub fn instances(&self) -> &[Option<InstanceId>] {
        &self.slots
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Lay out `text` and bind one instance per glyph-bearing character.
    ///
    /// Blank text (empty or whitespace only) clears the session instead.
    pub fn set_text<H>(&mut self, text: &str, font: &mut FontContext<H::Instance>, host: &mut H)
    where
        H: InstanceHost,
    {
        let tokens = TokenizedText::new(text);
        if tokens.is_blank() {
            self.clear_text(font, host);
            self.text = text.to_owned();
            self.tokens = tokens;
            return;
        }

        if self.options.auto_clear {
            self.clear_text(font, host);
        }

        let settings = LayoutSettings::new(&font.metrics, &self.options);
        let layout = compute_positions(&tokens, &font.registry, &settings);
        let material = self.material(font);
        let visible = self.options.visible;

        let mut previous = std::mem::take(&mut self.slots);
        let mut slots: Vec<Option<InstanceId>> = vec![None; tokens.char_count];
        let mut reused = 0;
        for (slot, key) in tokens.glyph_slots() {
            let (Some(record), Some(position)) =
                (font.registry.lookup(key.as_str()), layout.position(slot))
            else {
                continue;
            };
            let transform = instance_transform(position, record, &settings);

            let kept = previous.get_mut(slot).and_then(Option::take);
            let id = match kept {
                Some(id) if font.pool.key(id) == Some(key) => {
                    if let Some(instance) = font.pool.instance(id) {
                        host.set_transform(instance, transform);
                        host.set_material(instance, &material);
                        host.set_visible(instance, visible);
                    }
                    reused += 1;
                    id
                }
                stale => {
                    if let Some(id) = stale {
                        release(&mut font.pool, host, id);
                    }
                    let id = font.pool.acquire(host, record);
                    if let Some(instance) = font.pool.instance(id) {
                        host.activate(instance, transform, &material, visible);
                    }
                    id
                }
            };
            slots[slot] = Some(id);
        }
        for id in previous.into_iter().flatten() {
            release(&mut font.pool, host, id);
        }

        self.text = text.to_owned();
        self.tokens = tokens;
        self.layout = Some(layout);
        self.slots = slots;
        self.state = SessionState::Populated;
        debug!(
            "Set text \"{}\": {} instances ({} kept in place)",
            self.text,
            self.live_count(),
            reused
        );
    }

    /// Release every live instance and drop the layout. No-op when empty.
    pub fn clear_text<H>(&mut self, font: &mut FontContext<H::Instance>, host: &mut H)
    where
        H: InstanceHost,
    {
        if self.state == SessionState::Empty {
            return;
        }
        for id in std::mem::take(&mut self.slots).into_iter().flatten() {
            release(&mut font.pool, host, id);
        }
        self.text.clear();
        self.tokens = TokenizedText::default();
        self.layout = None;
        self.state = SessionState::Empty;
    }

    /// Release the instances shown for the given character slots only.
    pub fn clear_characters<H>(
        &mut self,
        indices: &[usize],
        font: &mut FontContext<H::Instance>,
        host: &mut H,
    ) where
        H: InstanceHost,
    {
        for &index in indices {
            if let Some(id) = self.slots.get_mut(index).and_then(Option::take) {
                release(&mut font.pool, host, id);
            }
        }
    }

    /// Re-run layout for the current text and options and move the existing
    /// instances. The text is not tokenized again.
    pub fn recompute_layout<H>(
        &mut self,
        font: &mut FontContext<H::Instance>,
        host: &mut H,
    ) -> Result<(), MeshTextError>
    where
        H: InstanceHost,
    {
        if self.state != SessionState::Populated {
            return Err(MeshTextError::NotPopulated);
        }
        let settings = LayoutSettings::new(&font.metrics, &self.options);
        let layout = compute_positions(&self.tokens, &font.registry, &settings);
        for (slot, id) in self.slots.iter().enumerate() {
            let (Some(id), Some(position)) = (id, layout.position(slot)) else {
                continue;
            };
            let record = font.pool.key(*id).and_then(|key| font.registry.lookup(key.as_str()));
            if let (Some(instance), Some(record)) = (font.pool.instance(*id), record) {
                host.set_transform(instance, instance_transform(position, record, &settings));
            }
        }
        self.layout = Some(layout);
        Ok(())
    }

    /// Show or hide every live instance without releasing it.
    pub fn set_visible<H>(&mut self, visible: bool, font: &FontContext<H::Instance>, host: &mut H)
    where
        H: InstanceHost,
    {
        self.options.visible = visible;
        for instance in self.live_instances(font) {
            host.set_visible(instance, visible);
        }
    }

    /// Use `material` (or the font's material when `None`) for every live
    /// and future instance.
    pub fn set_material<H>(
        &mut self,
        material: Option<Handle<StandardMaterial>>,
        font: &FontContext<H::Instance>,
        host: &mut H,
    ) where
        H: InstanceHost,
    {
        self.options.material = material;
        let material = self.material(font);
        for instance in self.live_instances(font) {
            host.set_material(instance, &material);
        }
    }

    /// Union of the bounds of every live instance, in the text's local space.
    pub fn bounds<T>(&self, font: &FontContext<T>) -> Result<Aabb, MeshTextError>
    where
        T: Copy + Eq + std::fmt::Debug,
    {
        let layout = match (&self.state, &self.layout) {
            (SessionState::Populated, Some(layout)) => layout,
            _ => return Err(MeshTextError::EmptyText),
        };
        let settings = LayoutSettings::new(&font.metrics, &self.options);
        let pairs: Vec<(Transform, Aabb)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| {
                let key = font.pool.key((*id)?)?;
                let record = font.registry.lookup(key.as_str())?;
                let position = layout.position(slot)?;
                Some((instance_transform(position, record, &settings), *record.bounds()))
            })
            .collect();
        union_bounds(pairs.iter().map(|(t, a)| (t, a))).ok_or(MeshTextError::EmptyText)
    }

    /// Size of the composed text. Monospaced text measures as its grid of
    /// cells; depth always comes from the instance bounds.
    pub fn size<T>(&self, font: &FontContext<T>) -> Result<Vec3, MeshTextError>
    where
        T: Copy + Eq + std::fmt::Debug,
    {
        let bounds = self.bounds(font)?;
        let size = Vec3::from(bounds.half_extents) * 2.0;
        if !self.options.monospaced {
            return Ok(size);
        }
        let Some(layout) = &self.layout else {
            return Err(MeshTextError::EmptyText);
        };
        let settings = LayoutSettings::new(&font.metrics, &self.options);
        let scale = settings.scale();
        Ok(Vec3::new(
            layout.columns as f32 * settings.monospaced_width * scale.x,
            layout.line_count() as f32 * settings.line_height * scale.y,
            size.z,
        ))
    }

    fn material<T>(&self, font: &FontContext<T>) -> Handle<StandardMaterial> {
        self.options
            .material
            .clone()
            .unwrap_or_else(|| font.material.clone())
    }

    fn live_instances<'a, T>(&'a self, font: &'a FontContext<T>) -> impl Iterator<Item = T> + 'a
    where
        T: Copy + Eq + std::fmt::Debug,
    {
        self.slots
            .iter()
            .flatten()
            .filter_map(|id| font.pool.instance(*id))
    }
}

/// Local transform of a glyph instance placed at `position`. The glyph's
/// mesh offset is applied in the rotated and scaled instance space.
pub fn instance_transform(
    position: Vec3,
    glyph: &GlyphRecord,
    settings: &LayoutSettings,
) -> Transform {
    let rotation = settings.rotation_quat();
    let scale = settings.scale();
    let offset = rotation * (scale * settings.mesh_offset(glyph));
    Transform::from_translation(position + offset)
        .with_rotation(rotation)
        .with_scale(scale)
}

fn release<H: InstanceHost>(pool: &mut InstancePool<H::Instance>, host: &mut H, id: InstanceId) {
    if let Err(err) = pool.release(host, id) {
        warn!("Failed to release glyph instance: {err}");
    }
}

#[cfg(test)]
mod tests {
    use bevy::asset::{Assets, Handle};

    use super::*;
    use crate::{
        layout::FontMetrics,
        pool::{PoolSettings, tests::RecordingHost},
        registry::GlyphRegistry,
    };

    fn font() -> FontContext<u32> {
        let glyph = |key: &str| {
            GlyphRecord::new(
                key,
                Handle::default(),
                Aabb::from_min_max(Vec3::ZERO, Vec3::new(0.05, 0.06, 0.01)),
            )
        };
        let registry = GlyphRegistry::build([["h", "e", "l", "o", "[UP]"].map(glyph)]);
        FontContext::new(
            FontMetrics::default(),
            Handle::default(),
            registry,
            PoolSettings {
                prewarm: 0,
                max_idle: 10,
            },
        )
    }

    #[test]
    fn set_text_binds_glyph_slots() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();

        session.set_text("he lo", &mut font, &mut host);
        assert_eq!(session.state(), SessionState::Populated);
        assert_eq!(session.instances().len(), 5);
        assert_eq!(session.live_count(), 4);
        assert!(session.instances()[2].is_none());
        assert_eq!(host.visible.len(), 4);
    }

    #[test]
    fn repeated_text_is_balanced() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();

        session.set_text("hello", &mut font, &mut host);
        let first = font.pool.stats();
        session.set_text("hello", &mut font, &mut host);
        assert_eq!(font.pool.stats(), first);

        session.clear_text(&mut font, &mut host);
        let stats = font.pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.idle, first.created);
    }

    #[test]
    fn clear_on_empty_session_is_noop() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        session.clear_text(&mut font, &mut host);
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(host.resets, 0);
    }

    #[test]
    fn blank_text_clears() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        session.set_text("hel", &mut font, &mut host);
        session.set_text("  ", &mut font, &mut host);
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.text(), "  ");
        assert_eq!(font.pool.stats().live, 0);
    }

    #[test]
    fn without_auto_clear_matching_slots_keep_their_instance() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::new(TextOptions {
            auto_clear: false,
            ..Default::default()
        });

        session.set_text("hel", &mut font, &mut host);
        let before = session.instances().to_vec();
        session.set_text("heo", &mut font, &mut host);
        let after = session.instances();

        assert_eq!(before[0], after[0]);
        assert_eq!(before[1], after[1]);
        assert_ne!(before[2], after[2]);
        assert_eq!(font.pool.stats().live, 3);
        assert_eq!(font.pool.stats().idle, 1);
    }

    #[test]
    fn recompute_moves_existing_instances() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        session.set_text("hel", &mut font, &mut host);
        let created = font.pool.stats().created;
        let last = font.pool.instance(session.instances()[2].unwrap()).unwrap();
        let x_before = host.transforms[&last].translation.x;

        let mut options = session.options().clone();
        options.size_multiplier = 2.0;
        session.set_options(options);
        session.recompute_layout(&mut font, &mut host).unwrap();

        let x_after = host.transforms[&last].translation.x;
        assert!((x_after - 2.0 * x_before).abs() < 1e-5);
        assert_eq!(host.transforms[&last].scale, Vec3::splat(2.0));
        assert_eq!(font.pool.stats().created, created);
    }

    #[test]
    fn recompute_requires_populated_session() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        assert_eq!(
            session.recompute_layout(&mut font, &mut host),
            Err(MeshTextError::NotPopulated)
        );
    }

    #[test]
    fn bounds_of_empty_session_fail() {
        let font = font();
        let session = TextSession::default();
        assert_eq!(session.bounds(&font).unwrap_err(), MeshTextError::EmptyText);
        assert_eq!(session.size(&font).unwrap_err(), MeshTextError::EmptyText);
    }

    #[test]
    fn bounds_cover_all_instances() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::new(TextOptions {
            vertical_alignment: VerticalAlignment::Top,
            ..Default::default()
        });
        session.set_text("he", &mut font, &mut host);

        let size = session.size(&font).unwrap();
        // two 0.05 wide glyphs with one spacing between them
        assert!((size.x - (0.05 * 2.0 + 0.0375)).abs() < 1e-5);
        assert!((size.y - 0.06).abs() < 1e-5);
    }

    #[test]
    fn monospaced_size_uses_grid() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::new(TextOptions {
            monospaced: true,
            ..Default::default()
        });
        session.set_text("hel\nlo", &mut font, &mut host);
        let size = session.size(&font).unwrap();
        assert!((size.x - 3.0 * 0.075).abs() < 1e-5);
        assert!((size.y - 2.0 * 0.06).abs() < 1e-5);
        assert!((size.z - 0.01).abs() < 1e-5);
    }

    #[test]
    fn clear_characters_releases_selected_slots() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        session.set_text("hello", &mut font, &mut host);
        session.clear_characters(&[0, 4, 99], &mut font, &mut host);
        assert_eq!(session.live_count(), 3);
        assert_eq!(font.pool.stats().live, 3);
        assert!(session.is_populated());
    }

    #[test]
    fn visibility_toggles_live_instances() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        session.set_text("hel", &mut font, &mut host);
        session.set_visible(false, &font, &mut host);
        assert!(host.visible.is_empty());
        session.set_visible(true, &font, &mut host);
        assert_eq!(host.visible.len(), 3);
    }

    #[test]
    fn escape_glyph_occupies_its_first_slot() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::default();
        session.set_text("$[UP]h", &mut font, &mut host);
        let slots = session.instances();
        assert_eq!(slots.len(), 6);
        assert!(slots[0].is_some());
        assert!(slots[1..5].iter().all(Option::is_none));
        assert!(slots[5].is_some());
        assert_eq!(font.pool.key(slots[0].unwrap()).unwrap().as_str(), "[UP]");
    }

    #[test]
    fn material_override_reaches_live_and_new_instances() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut materials = Assets::<StandardMaterial>::default();
        let red = materials.add(StandardMaterial::default());
        let mut session = TextSession::default();

        session.set_text("he", &mut font, &mut host);
        session.set_material(Some(red.clone()), &font, &mut host);
        session.set_text("hel", &mut font, &mut host);
        let live: Vec<u32> = session
            .instances()
            .iter()
            .flatten()
            .filter_map(|id| font.pool.instance(*id))
            .collect();
        assert_eq!(live.len(), 3);
        assert!(live.iter().all(|i| host.materials[i] == red));

        session.set_material(None, &font, &mut host);
        assert!(live.iter().all(|i| host.materials[i] == font.material));
        assert!(session.options().material.is_none());
    }

    #[test]
    fn glyph_mesh_is_centered_on_its_cursor() {
        let mut font = font();
        let mut host = RecordingHost::default();
        let mut session = TextSession::new(TextOptions {
            vertical_alignment: VerticalAlignment::Top,
            ..Default::default()
        });
        session.set_text("h", &mut font, &mut host);

        let bounds = session.bounds(&font).unwrap();
        assert!(bounds.center.x.abs() < 1e-6);
        // recentered by half the height, raised by a twentieth of it
        assert!((bounds.min().y - (-0.03 + 0.003)).abs() < 1e-6);
        assert!((bounds.min().z + 0.005).abs() < 1e-6);
    }
}
