//! Minimal entity store the scripting host reads and the interop callbacks mutate.
//!
//! Only the components that cross the managed boundary live here: a stable 64-bit id,
//! a tag, a transform and the script binding.

use bevy_ecs::prelude::*;
use glam::Vec3;
use std::collections::HashMap;

#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdComponent(pub u64);

#[derive(Component, Clone, Debug, Default, PartialEq, Eq)]
pub struct TagComponent(pub String);

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct TransformComponent {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Vec3::ZERO, scale: Vec3::ONE }
    }
}

/// Binds an entity to a managed class, instantiated when the runtime starts.
#[derive(Component, Clone, Debug, PartialEq, Eq)]
pub struct ScriptComponent {
    pub class_name: String,
}

pub struct Scene {
    name: String,
    world: World,
    by_uuid: HashMap<u64, Entity>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), world: World::new(), by_uuid: HashMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_entity(&mut self, tag: &str) -> Entity {
        let mut uuid = rand::random::<u64>();
        while uuid == 0 || self.by_uuid.contains_key(&uuid) {
            uuid = rand::random::<u64>();
        }
        self.create_entity_with_uuid(uuid, tag)
    }

    /// Spawns an entity with a caller-chosen id. An existing entity with the same id is replaced.
    pub fn create_entity_with_uuid(&mut self, uuid: u64, tag: &str) -> Entity {
        if let Some(previous) = self.by_uuid.remove(&uuid) {
            self.world.despawn(previous);
        }
        let tag = if tag.is_empty() { "Entity" } else { tag };
        let entity =
            self.world.spawn((IdComponent(uuid), TagComponent(tag.to_string()), TransformComponent::default())).id();
        self.by_uuid.insert(uuid, entity);
        entity
    }

    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        let Some(uuid) = self.entity_uuid(entity) else {
            return false;
        };
        self.by_uuid.remove(&uuid);
        self.world.despawn(entity)
    }

    pub fn entity_uuid(&self, entity: Entity) -> Option<u64> {
        self.world.get::<IdComponent>(entity).map(|id| id.0)
    }

    pub fn find_entity_by_uuid(&self, uuid: u64) -> Option<Entity> {
        self.by_uuid.get(&uuid).copied()
    }

    pub fn tag(&self, entity: Entity) -> Option<&str> {
        self.world.get::<TagComponent>(entity).map(|tag| tag.0.as_str())
    }

    pub fn add_script(&mut self, entity: Entity, class_name: &str) -> bool {
        if self.entity_uuid(entity).is_none() {
            return false;
        }
        self.world.entity_mut(entity).insert(ScriptComponent { class_name: class_name.to_string() });
        true
    }

    pub fn has_script(&self, entity: Entity) -> bool {
        self.world.get::<ScriptComponent>(entity).is_some()
    }

    pub fn script_class(&self, entity: Entity) -> Option<&str> {
        self.world.get::<ScriptComponent>(entity).map(|script| script.class_name.as_str())
    }

    pub fn translation(&self, entity: Entity) -> Option<Vec3> {
        self.world.get::<TransformComponent>(entity).map(|transform| transform.translation)
    }

    pub fn set_translation(&mut self, entity: Entity, translation: Vec3) -> bool {
        match self.world.get_mut::<TransformComponent>(entity) {
            Some(mut transform) => {
                transform.translation = translation;
                true
            }
            None => false,
        }
    }

    /// Entities carrying a script binding, in spawn order.
    pub fn scripted_entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .world
            .iter_entities()
            .filter(|entity| entity.contains::<ScriptComponent>() && entity.contains::<IdComponent>())
            .map(|entity| entity.id())
            .collect();
        entities.sort();
        entities
    }

    pub fn entity_count(&self) -> usize {
        self.by_uuid.len()
    }

    /// Copies every entity with its id, tag, transform and script binding into a fresh scene.
    pub fn duplicate(&self) -> Scene {
        let mut source: Vec<Entity> = self.by_uuid.values().copied().collect();
        source.sort();
        let mut copy = Scene::new(self.name.clone());
        for entity in source {
            let Some(uuid) = self.entity_uuid(entity) else {
                continue;
            };
            let new_entity = copy.create_entity_with_uuid(uuid, self.tag(entity).unwrap_or_default());
            if let Some(transform) = self.world.get::<TransformComponent>(entity) {
                copy.world.entity_mut(new_entity).insert(*transform);
            }
            if let Some(script) = self.world.get::<ScriptComponent>(entity) {
                copy.world.entity_mut(new_entity).insert(script.clone());
            }
        }
        copy
    }
}
