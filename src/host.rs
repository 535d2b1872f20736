use bevy::{
    asset::Handle,
    ecs::world::World,
    light::NotShadowCaster,
    pbr::StandardMaterial,
    prelude::{ChildOf, Component, Entity, Mesh3d, MeshMaterial3d, Transform, Visibility},
};
use bevy_log::debug;

use crate::{
    glyph::{GlyphKey, GlyphRecord},
    pool::InstanceHost,
};

/// Marks an entity spawned to render one glyph of a [`crate::MeshText`].
#[derive(Component, Clone, Debug)]
pub struct GlyphInstance {
    pub key: GlyphKey,
}

/// Glyph instances as entities of a Bevy [`World`].
///
/// Checked-out instances become children of `parent`; idle ones are
/// detached and hidden.
pub struct WorldInstanceHost<'w> {
    world: &'w mut World,
    parent: Entity,
    cast_shadows: bool,
}

impl<'w> WorldInstanceHost<'w> {
    pub fn new(world: &'w mut World, parent: Entity, cast_shadows: bool) -> Self {
        Self {
            world,
            parent,
            cast_shadows,
        }
    }

    /// A host that only releases and destroys instances, used at teardown.
    pub fn detached(world: &'w mut World) -> Self {
        Self::new(world, Entity::PLACEHOLDER, false)
    }
}

impl InstanceHost for WorldInstanceHost<'_> {
    type Instance = Entity;

    fn create(&mut self, glyph: &GlyphRecord) -> Entity {
        let mut entity = self.world.spawn((
            GlyphInstance {
                key: glyph.key().clone(),
            },
            Mesh3d(glyph.mesh().clone()),
            Transform::IDENTITY,
            Visibility::Hidden,
        ));
        if !self.cast_shadows {
            entity.insert(NotShadowCaster);
        }
        let id = entity.id();
        debug!("Spawned glyph instance {:?} for \"{}\"", id, glyph.key());
        id
    }

    fn activate(
        &mut self,
        instance: Entity,
        transform: Transform,
        material: &Handle<StandardMaterial>,
        visible: bool,
    ) {
        let Ok(mut entity) = self.world.get_entity_mut(instance) else {
            debug!("Glyph instance {:?} no longer exists", instance);
            return;
        };
        entity.insert((
            transform,
            MeshMaterial3d(material.clone()),
            visibility(visible),
        ));
        if let Ok(mut parent) = self.world.get_entity_mut(self.parent) {
            parent.add_child(instance);
        }
    }

    fn set_transform(&mut self, instance: Entity, transform: Transform) {
        if let Ok(mut entity) = self.world.get_entity_mut(instance) {
            entity.insert(transform);
        }
    }

    fn set_visible(&mut self, instance: Entity, visible: bool) {
        if let Ok(mut entity) = self.world.get_entity_mut(instance) {
            entity.insert(visibility(visible));
        }
    }

    fn set_material(&mut self, instance: Entity, material: &Handle<StandardMaterial>) {
        if let Ok(mut entity) = self.world.get_entity_mut(instance) {
            entity.insert(MeshMaterial3d(material.clone()));
        }
    }

    fn reset(&mut self, instance: Entity) -> bool {
        let Ok(mut entity) = self.world.get_entity_mut(instance) else {
            return false;
        };
        entity
            .remove::<ChildOf>()
            .insert((Transform::IDENTITY, Visibility::Hidden));
        true
    }

    fn destroy(&mut self, instance: Entity) {
        if let Ok(entity) = self.world.get_entity_mut(instance) {
            entity.despawn();
        }
    }
}

fn visibility(visible: bool) -> Visibility {
    if visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}

#[cfg(test)]
mod tests {
    use bevy::{asset::Handle, math::Vec3};
    use bevy_camera::primitives::Aabb;

    use super::*;

    fn record() -> GlyphRecord {
        GlyphRecord::new(
            "A",
            Handle::default(),
            Aabb::from_min_max(Vec3::ZERO, Vec3::splat(0.05)),
        )
    }

    #[test]
    fn activate_parents_and_reset_detaches() {
        let mut world = World::new();
        let parent = world.spawn(Transform::IDENTITY).id();
        let mut host = WorldInstanceHost::new(&mut world, parent, false);

        let instance = host.create(&record());
        host.activate(
            instance,
            Transform::from_xyz(1.0, 0.0, 0.0),
            &Handle::default(),
            true,
        );
        assert!(host.reset(instance));
        host.destroy(instance);
        assert!(!host.reset(instance));

        assert!(world.get_entity(instance).is_err());
    }

    #[test]
    fn created_instances_start_hidden() {
        let mut world = World::new();
        let parent = world.spawn(Transform::IDENTITY).id();
        let instance = WorldInstanceHost::new(&mut world, parent, false).create(&record());

        assert_eq!(world.get::<Visibility>(instance), Some(&Visibility::Hidden));
        assert!(world.get::<NotShadowCaster>(instance).is_some());
        assert!(world.get::<ChildOf>(instance).is_none());
    }

    #[test]
    fn activated_instances_are_children() {
        let mut world = World::new();
        let parent = world.spawn(Transform::IDENTITY).id();
        let instance = {
            let mut host = WorldInstanceHost::new(&mut world, parent, true);
            let instance = host.create(&record());
            host.activate(instance, Transform::IDENTITY, &Handle::default(), true);
            instance
        };

        assert_eq!(world.get::<ChildOf>(instance).map(ChildOf::parent), Some(parent));
        assert_eq!(world.get::<Visibility>(instance), Some(&Visibility::Inherited));
        assert!(world.get::<NotShadowCaster>(instance).is_none());
    }

    #[test]
    fn material_is_replaced_in_place() {
        let mut world = World::new();
        let parent = world.spawn(Transform::IDENTITY).id();
        let mut materials = bevy::asset::Assets::<StandardMaterial>::default();
        let red = materials.add(StandardMaterial::default());
        let instance = {
            let mut host = WorldInstanceHost::new(&mut world, parent, false);
            let instance = host.create(&record());
            host.activate(instance, Transform::IDENTITY, &Handle::default(), true);
            host.set_material(instance, &red);
            instance
        };

        let material = world.get::<MeshMaterial3d<StandardMaterial>>(instance);
        assert_eq!(material.map(|m| m.0.id()), Some(red.id()));
    }
}
