use std::collections::HashMap;

use bevy::{
    app::{App, Plugin, PostUpdate},
    asset::{AssetApp, AssetId, Assets, Handle},
    ecs::{
        message::{Message, Messages},
        world::{Mut, World},
    },
    math::Vec3,
    pbr::StandardMaterial,
    prelude::{Component, Entity, Mesh, Resource, Transform, Visibility},
};
use bevy_camera::primitives::Aabb;
use bevy_log::{debug, info};

use crate::{
    error::MeshTextError,
    font::{GlyphFont, GlyphFontContexts},
    host::WorldInstanceHost,
    layout::{HorizontalAlignment, VerticalAlignment},
    pool::PoolSettings,
    session::{TextOptions, TextSession},
};

/// A block of 3D text built from the glyph meshes of a [`GlyphFont`].
///
/// Glyph instances are spawned as children of the entity holding this
/// component. Changes are applied in `PostUpdate`.
#[derive(Component, Clone, Debug)]
#[require(Transform, Visibility)]
pub struct MeshText {
    font: Handle<GlyphFont>,
    text: String,
    options: TextOptions,
    pending_clear: Vec<usize>,
    // Bumped by the setters so the sync system can tell a new text from an
    // options-only change.
    text_revision: u64,
    options_revision: u64,
}

impl MeshText {
    pub fn new(font: Handle<GlyphFont>, text: impl Into<String>) -> Self {
        Self {
            font,
            text: text.into(),
            options: TextOptions::default(),
            pending_clear: Vec::new(),
            text_revision: 0,
            options_revision: 0,
        }
    }

    pub fn with_options(mut self, options: TextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_alignment(
        mut self,
        horizontal: HorizontalAlignment,
        vertical: VerticalAlignment,
    ) -> Self {
        self.options.horizontal_alignment = horizontal;
        self.options.vertical_alignment = vertical;
        self
    }

    pub fn with_size_multiplier(mut self, size_multiplier: f32) -> Self {
        self.options.size_multiplier = size_multiplier;
        self
    }

    pub fn with_monospaced(mut self, monospaced: bool) -> Self {
        self.options.monospaced = monospaced;
        self
    }

    pub fn font(&self) -> &Handle<GlyphFont> {
        &self.font
    }

    pub fn font_id(&self) -> AssetId<GlyphFont> {
        self.font.id()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text. Setting blank text clears the rendered glyphs.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.text_revision = self.text_revision.wrapping_add(1);
    }

    /// Remove the rendered glyphs, keeping the options.
    pub fn clear(&mut self) {
        self.set_text(String::new());
    }

    /// Hide the glyphs at the given character slots. Slots count every
    /// character of the text, newlines included.
    pub fn clear_characters(&mut self, indices: impl IntoIterator<Item = usize>) {
        self.pending_clear.extend(indices);
    }

    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    /// Mutable access to the options. Existing glyphs are moved to the new
    /// layout without being respawned.
    pub fn options_mut(&mut self) -> &mut TextOptions {
        self.options_revision = self.options_revision.wrapping_add(1);
        &mut self.options
    }

    pub fn set_options(&mut self, options: TextOptions) {
        *self.options_mut() = options;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.options_mut().visible = visible;
    }

    pub fn set_material(&mut self, material: Option<Handle<StandardMaterial>>) {
        self.options_mut().material = material;
    }
}

/// Configuration options for the [`MeshTextPlugin`].
#[derive(Clone, Debug, Default, Resource)]
pub struct MeshTextPluginConfig {
    /// Pooling policy of every font's glyph instances.
    pub pool: PoolSettings,
}

#[derive(Debug)]
struct TrackedSession {
    font: AssetId<GlyphFont>,
    session: TextSession,
    text_revision: Option<u64>,
    options_revision: Option<u64>,
}

/// Text sessions of every entity with a [`MeshText`].
#[derive(Debug, Default, Resource)]
pub struct MeshTextSessions {
    sessions: HashMap<Entity, TrackedSession>,
}

impl MeshTextSessions {
    pub fn get(&self, entity: Entity) -> Option<&TextSession> {
        self.sessions.get(&entity).map(|tracked| &tracked.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Bounds of the text of `entity` in its local space.
    pub fn bounds(
        &self,
        entity: Entity,
        contexts: &GlyphFontContexts,
    ) -> Result<Aabb, MeshTextError> {
        let tracked = self.sessions.get(&entity).ok_or(MeshTextError::EmptyText)?;
        let font = contexts.get(tracked.font).ok_or(MeshTextError::EmptyText)?;
        tracked.session.bounds(font)
    }

    /// Size of the text of `entity`, see [`TextSession::size`].
    pub fn size(
        &self,
        entity: Entity,
        contexts: &GlyphFontContexts,
    ) -> Result<Vec3, MeshTextError> {
        let tracked = self.sessions.get(&entity).ok_or(MeshTextError::EmptyText)?;
        let font = contexts.get(tracked.font).ok_or(MeshTextError::EmptyText)?;
        tracked.session.size(font)
    }
}

/// Sent once a [`MeshText`] has laid out and shown its glyphs.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshTextReady {
    pub entity: Entity,
}

/// Sent before the glyphs of a populated [`MeshText`] are released.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshTextCleared {
    pub entity: Entity,
}

fn write_message<M: Message>(world: &mut World, message: M) {
    if let Some(mut messages) = world.get_resource_mut::<Messages<M>>() {
        messages.write(message);
    }
}

struct TextRequest {
    entity: Entity,
    font: AssetId<GlyphFont>,
    text: Option<(u64, String)>,
    options: Option<(u64, TextOptions)>,
}

/// Apply changed [`MeshText`] components to their sessions.
///
/// Fonts whose glyph meshes are still loading are skipped and retried on
/// the next run.
pub fn sync_mesh_text_system(world: &mut World) {
    if !world.contains_resource::<Assets<GlyphFont>>()
        || !world.contains_resource::<Assets<Mesh>>()
    {
        return;
    }
    let pool = world
        .get_resource::<MeshTextPluginConfig>()
        .map(|config| config.pool)
        .unwrap_or_default();

    world.resource_scope(|world, mut sessions: Mut<MeshTextSessions>| {
        world.resource_scope(|world, mut contexts: Mut<GlyphFontContexts>| {
            release_orphaned_sessions(world, &mut sessions, &mut contexts);

            let requests = collect_requests(world, &sessions);
            for request in requests {
                let ready = contexts.ensure(
                    request.font,
                    world.resource::<Assets<GlyphFont>>(),
                    world.resource::<Assets<Mesh>>(),
                    pool,
                );
                if ready {
                    apply_request(world, &mut sessions, &mut contexts, request);
                }
            }
        });
    });
}

/// Clear the sessions whose entity lost its [`MeshText`] or switched font.
fn release_orphaned_sessions(
    world: &mut World,
    sessions: &mut MeshTextSessions,
    contexts: &mut GlyphFontContexts,
) {
    let orphaned: Vec<Entity> = sessions
        .sessions
        .iter()
        .filter(|(entity, tracked)| {
            world
                .get::<MeshText>(**entity)
                .is_none_or(|text| text.font_id() != tracked.font)
        })
        .map(|(entity, _)| *entity)
        .collect();

    for entity in orphaned {
        let Some(mut tracked) = sessions.sessions.remove(&entity) else {
            continue;
        };
        if tracked.session.is_populated() {
            write_message(world, MeshTextCleared { entity });
        }
        if let Some(font) = contexts.get_mut(tracked.font) {
            let mut host = WorldInstanceHost::new(world, entity, font.cast_shadows);
            tracked.session.clear_text(font, &mut host);
        }
        debug!("Released text session of {:?}", entity);
    }
}

fn collect_requests(world: &mut World, sessions: &MeshTextSessions) -> Vec<TextRequest> {
    let mut query = world.query::<(Entity, &MeshText)>();
    let mut requests = Vec::new();
    for (entity, text) in query.iter(world) {
        let tracked = sessions.sessions.get(&entity);
        let text_changed = tracked.is_none_or(|t| t.text_revision != Some(text.text_revision));
        let options_changed =
            tracked.is_none_or(|t| t.options_revision != Some(text.options_revision));
        if !text_changed && !options_changed && text.pending_clear.is_empty() {
            continue;
        }
        requests.push(TextRequest {
            entity,
            font: text.font_id(),
            text: text_changed.then(|| (text.text_revision, text.text.clone())),
            options: (text_changed || options_changed)
                .then(|| (text.options_revision, text.options.clone())),
        });
    }
    requests
}

fn apply_request(
    world: &mut World,
    sessions: &mut MeshTextSessions,
    contexts: &mut GlyphFontContexts,
    request: TextRequest,
) {
    let Some(font) = contexts.get_mut(request.font) else {
        return;
    };
    let tracked = sessions
        .sessions
        .entry(request.entity)
        .or_insert_with(|| TrackedSession {
            font: request.font,
            session: TextSession::default(),
            text_revision: None,
            options_revision: None,
        });
    let entity = request.entity;
    let session = &mut tracked.session;

    // Taken only once the font is ready so that no index is lost.
    let clear_characters = world
        .get_mut::<MeshText>(entity)
        .filter(|text| !text.pending_clear.is_empty())
        .map(|mut text| std::mem::take(&mut text.pending_clear))
        .unwrap_or_default();

    if let (Some((_, text)), Some((_, options))) = (&request.text, &request.options)
        && session.is_populated()
        && (options.auto_clear || text.chars().all(char::is_whitespace))
    {
        write_message(world, MeshTextCleared { entity });
    }

    let mut host = WorldInstanceHost::new(world, entity, font.cast_shadows);
    let mut ready = false;
    match (request.text, request.options) {
        (Some((text_revision, text)), Some((options_revision, options))) => {
            session.set_options(options);
            session.set_text(&text, font, &mut host);
            tracked.text_revision = Some(text_revision);
            tracked.options_revision = Some(options_revision);
            ready = session.is_populated();
        }
        (None, Some((options_revision, options))) => {
            if options.visible != session.options().visible {
                session.set_visible(options.visible, font, &mut host);
            }
            if options.material != session.options().material {
                session.set_material(options.material.clone(), font, &mut host);
            }
            session.set_options(options);
            if session.is_populated()
                && let Err(err) = session.recompute_layout(font, &mut host)
            {
                debug!("Layout of {:?} not updated: {err}", entity);
            }
            tracked.options_revision = Some(options_revision);
        }
        _ => {}
    }

    if !clear_characters.is_empty() {
        session.clear_characters(&clear_characters, font, &mut host);
    }
    if ready {
        write_message(world, MeshTextReady { entity });
    }
}

/// Release every text session, then every font's pooled instances and glyph
/// records. Safe to call more than once.
pub fn teardown_mesh_text(world: &mut World) {
    let mut sessions = world.remove_resource::<MeshTextSessions>().unwrap_or_default();
    let mut contexts = world.remove_resource::<GlyphFontContexts>().unwrap_or_default();

    for (entity, mut tracked) in sessions.sessions.drain() {
        if tracked.session.is_populated() {
            write_message(world, MeshTextCleared { entity });
        }
        if let Some(font) = contexts.get_mut(tracked.font) {
            let mut host = WorldInstanceHost::new(world, entity, font.cast_shadows);
            tracked.session.clear_text(font, &mut host);
        }
    }
    for (id, mut font) in contexts.drain() {
        font.teardown(&mut WorldInstanceHost::detached(world));
        info!("Tore down font context {:?}", id);
    }

    world.insert_resource(sessions);
    world.insert_resource(contexts);
}

/// Plugin that registers the [`GlyphFont`] asset and keeps [`MeshText`]
/// entities in sync with their glyph instances.
#[derive(Default)]
pub struct MeshTextPlugin {
    config: MeshTextPluginConfig,
}

impl MeshTextPlugin {
    /// Creates a new MeshTextPlugin with custom configuration.
    pub fn with_config(config: MeshTextPluginConfig) -> Self {
        Self { config }
    }
}

impl Plugin for MeshTextPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<GlyphFont>()
            .insert_resource(self.config.clone())
            .init_resource::<GlyphFontContexts>()
            .init_resource::<MeshTextSessions>()
            .add_message::<MeshTextReady>()
            .add_message::<MeshTextCleared>()
            .add_systems(PostUpdate, sync_mesh_text_system);
    }
}
