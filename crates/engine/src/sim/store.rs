use super::entity::{Entity, EntityId, EntitySpawn};
use super::math::Vec3;

/// Slot arena of entities indexed by id. Slots of destroyed entities stay
/// empty, so ids are never handed out twice.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: Vec<Option<Entity>>,
    live_count: usize,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> EntityId {
        EntityId(self.slots.len() as u64)
    }

    pub(crate) fn create(
        &mut self,
        spawn: EntitySpawn,
        home_position: Vec3,
        default_wander_radius: f32,
        default_max_force: f32,
    ) -> EntityId {
        let id = self.next_id();
        self.slots.push(Some(Entity::new(
            id,
            spawn,
            home_position,
            default_wander_radius,
            default_max_force,
        )));
        self.live_count += 1;
        id
    }

    pub(crate) fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slots.get_mut(slot_index(id)?)?;
        let removed = slot.take();
        if removed.is_some() {
            self.live_count -= 1;
        }
        removed
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(slot_index(id)?)?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(slot_index(id)?)?.as_mut()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.live_count
    }

    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Ids of live entities at the time of the call, in creation order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(Entity::id).collect()
    }

    /// Nearest entity other than `source_id` that matches `predicate`.
    /// Ties keep the first entity encountered.
    pub fn find_nearest<P, F>(
        &self,
        source_id: EntityId,
        position_of: P,
        mut predicate: F,
    ) -> Option<(EntityId, f32)>
    where
        P: Fn(&Entity) -> Vec3,
        F: FnMut(&Entity) -> bool,
    {
        let source = self.get(source_id)?;
        let origin = position_of(source);
        let mut nearest: Option<(EntityId, f32)> = None;
        for candidate in self.iter() {
            if candidate.id() == source_id || !predicate(candidate) {
                continue;
            }
            let distance = origin.distance(position_of(candidate));
            let is_closer = nearest.map_or(true, |(_, best)| distance < best);
            if is_closer {
                nearest = Some((candidate.id(), distance));
            }
        }
        nearest
    }

    pub fn entities_within<P>(&self, point: Vec3, radius: f32, position_of: P) -> Vec<EntityId>
    where
        P: Fn(&Entity) -> Vec3,
    {
        let radius_sq = radius * radius;
        self.iter()
            .filter(|entity| position_of(entity).distance_squared(point) <= radius_sq)
            .map(Entity::id)
            .collect()
    }
}

fn slot_index(id: EntityId) -> Option<usize> {
    usize::try_from(id.0).ok()
}
