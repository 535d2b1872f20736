use std::{collections::HashMap, fmt::Debug};

use bevy::{asset::Handle, pbr::StandardMaterial, prelude::Transform};
use bevy_log::{debug, warn};
use slotmap::{SlotMap, new_key_type};

use crate::{
    error::MeshTextError,
    glyph::{GlyphKey, GlyphRecord},
};

new_key_type! {
    /// Arena slot of one pooled render instance.
    pub struct InstanceId;
}

/// The scene side of a glyph instance: builds render instances for a glyph
/// and applies transform, visibility and material commands to them.
pub trait InstanceHost {
    type Instance: Copy + Eq + Debug;

    /// Construct a hidden, detached instance rendering `glyph`'s mesh.
    fn create(&mut self, glyph: &GlyphRecord) -> Self::Instance;

    /// Attach a checked-out instance to its text and show it.
    fn activate(
        &mut self,
        instance: Self::Instance,
        transform: Transform,
        material: &Handle<StandardMaterial>,
        visible: bool,
    );

    fn set_transform(&mut self, instance: Self::Instance, transform: Transform);

    fn set_visible(&mut self, instance: Self::Instance, visible: bool);

    fn set_material(&mut self, instance: Self::Instance, material: &Handle<StandardMaterial>);

    /// Detach, hide and reset the transform of an instance returning to its
    /// pool. Returns `false` if the instance no longer exists.
    fn reset(&mut self, instance: Self::Instance) -> bool;

    fn destroy(&mut self, instance: Self::Instance);
}

/// Capacity of every per-glyph pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Instances created up front the first time a glyph is requested.
    pub prewarm: usize,
    /// Idle instances retained per glyph; releases beyond this destroy.
    pub max_idle: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            prewarm: 1,
            max_idle: 10,
        }
    }
}

/// Counters over every glyph pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub live: usize,
    pub idle: usize,
    pub created: usize,
    pub destroyed: usize,
}

#[derive(Debug)]
struct PooledInstance<T> {
    key: GlyphKey,
    instance: T,
    live: bool,
}

/// Recyclable render instances for every glyph key of one font context.
///
/// Idle instances are reused last-in first-out. Pools grow on demand and
/// only shrink when a release would exceed `max_idle`.
#[derive(Debug)]
pub struct InstancePool<T> {
    settings: PoolSettings,
    arena: SlotMap<InstanceId, PooledInstance<T>>,
    idle: HashMap<GlyphKey, Vec<InstanceId>>,
    created: usize,
    destroyed: usize,
}

impl<T: Copy + Eq + Debug> Default for InstancePool<T> {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

impl<T: Copy + Eq + Debug> InstancePool<T> {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            arena: SlotMap::with_key(),
            idle: HashMap::new(),
            created: 0,
            destroyed: 0,
        }
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Check out an instance for `glyph`, reusing an idle one when possible.
    pub fn acquire<H>(&mut self, host: &mut H, glyph: &GlyphRecord) -> InstanceId
    where
        H: InstanceHost<Instance = T>,
    {
        if !self.idle.contains_key(glyph.key()) {
            self.prewarm(host, glyph);
        }

        let reused = self.idle.get_mut(glyph.key()).and_then(Vec::pop);
        if let Some(id) = reused
            && let Some(entry) = self.arena.get_mut(id)
        {
            entry.live = true;
            return id;
        }

        let instance = self.construct(host, glyph);
        self.arena.insert(PooledInstance {
            key: glyph.key().clone(),
            instance,
            live: true,
        })
    }

    /// Return a checked-out instance to its pool, or destroy it when the pool
    /// already holds `max_idle` idle instances.
    pub fn release<H>(&mut self, host: &mut H, id: InstanceId) -> Result<(), MeshTextError>
    where
        H: InstanceHost<Instance = T>,
    {
        let Some(entry) = self.arena.get(id).filter(|entry| entry.live) else {
            return Err(MeshTextError::UnknownInstance(id));
        };
        let instance = entry.instance;
        let idle = self.idle.entry(entry.key.clone()).or_default();

        if idle.len() >= self.settings.max_idle {
            debug!(
                "Pool for \"{}\" is full ({}); destroying {:?}",
                entry.key, idle.len(), instance
            );
            host.destroy(instance);
            self.arena.remove(id);
            self.destroyed += 1;
            return Ok(());
        }

        if !host.reset(instance) {
            debug!("Instance {:?} vanished before release; dropping it", instance);
            self.arena.remove(id);
            return Ok(());
        }

        idle.push(id);
        if let Some(entry) = self.arena.get_mut(id) {
            entry.live = false;
        }
        Ok(())
    }

    /// Destroy every idle instance. Live instances must be released by their
    /// owners first; any still checked out are left untouched.
    pub fn clear<H>(&mut self, host: &mut H)
    where
        H: InstanceHost<Instance = T>,
    {
        let live = self.arena.values().filter(|entry| entry.live).count();
        if live > 0 {
            warn!("Clearing glyph pools while {live} instances are still checked out");
        }
        for (_, ids) in self.idle.drain() {
            for id in ids {
                if let Some(entry) = self.arena.remove(id) {
                    host.destroy(entry.instance);
                    self.destroyed += 1;
                }
            }
        }
    }

    /// Host instance behind a pooled id.
    pub fn instance(&self, id: InstanceId) -> Option<T> {
        self.arena.get(id).map(|entry| entry.instance)
    }

    pub fn key(&self, id: InstanceId) -> Option<&GlyphKey> {
        self.arena.get(id).map(|entry| &entry.key)
    }

    pub fn is_live(&self, id: InstanceId) -> bool {
        self.arena.get(id).is_some_and(|entry| entry.live)
    }

    pub fn idle_count(&self, key: &str) -> usize {
        self.idle.get(key).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> PoolStats {
        let live = self.arena.values().filter(|entry| entry.live).count();
        PoolStats {
            live,
            idle: self.arena.len() - live,
            created: self.created,
            destroyed: self.destroyed,
        }
    }

    fn prewarm<H>(&mut self, host: &mut H, glyph: &GlyphRecord)
    where
        H: InstanceHost<Instance = T>,
    {
        let count = self.settings.prewarm.min(self.settings.max_idle);
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let instance = self.construct(host, glyph);
            ids.push(self.arena.insert(PooledInstance {
                key: glyph.key().clone(),
                instance,
                live: false,
            }));
        }
        debug!("Pre-warmed {} instances for \"{}\"", count, glyph.key());
        self.idle.insert(glyph.key().clone(), ids);
    }

    fn construct<H>(&mut self, host: &mut H, glyph: &GlyphRecord) -> T
    where
        H: InstanceHost<Instance = T>,
    {
        self.created += 1;
        host.create(glyph)
    }
}
