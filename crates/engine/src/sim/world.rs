use std::collections::BTreeMap;

use super::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyObject {
    pub id: ObjectId,
    pub kind: String,
    pub position: Vec3,
}

/// Position storage owned by the host. The simulation core only refers to
/// objects by id and never keeps them alive.
pub trait WorldObjects {
    fn position(&self, id: ObjectId) -> Option<Vec3>;
    fn set_position(&mut self, id: ObjectId, position: Vec3) -> bool;
    fn remove(&mut self, id: ObjectId) -> bool;
    fn objects_within(&self, point: Vec3, radius: f32) -> Vec<NearbyObject>;

    fn time_of_day(&self) -> f32 {
        0.0
    }

    fn terrain_height(&self, _x: f32, _z: f32) -> f32 {
        0.0
    }

    fn line_of_sight(&self, _from: Vec3, _to: Vec3) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub id: ObjectId,
    pub kind: String,
    pub position: Vec3,
}

#[derive(Debug, Clone)]
pub struct ObjectRegistry {
    next_id: u64,
    objects: BTreeMap<ObjectId, WorldObject>,
    time_of_day: f32,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self {
            next_id: 1,
            objects: BTreeMap::new(),
            time_of_day: 0.0,
        }
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: impl Into<String>, position: Vec3) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.objects.insert(
            id,
            WorldObject {
                id,
                kind: kind.into(),
                position,
            },
        );
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn set_time_of_day(&mut self, seconds: f32) {
        self.time_of_day = seconds;
    }

    pub fn advance_time(&mut self, dt_seconds: f32) {
        self.time_of_day = (self.time_of_day + dt_seconds).rem_euclid(SECONDS_PER_DAY);
    }
}

const SECONDS_PER_DAY: f32 = 86_400.0;

impl WorldObjects for ObjectRegistry {
    fn position(&self, id: ObjectId) -> Option<Vec3> {
        self.objects.get(&id).map(|object| object.position)
    }

    fn set_position(&mut self, id: ObjectId, position: Vec3) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        object.position = position;
        true
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        self.objects.remove(&id).is_some()
    }

    fn objects_within(&self, point: Vec3, radius: f32) -> Vec<NearbyObject> {
        let radius_sq = radius * radius;
        self.objects
            .values()
            .filter(|object| object.position.distance_squared(point) <= radius_sq)
            .map(|object| NearbyObject {
                id: object.id,
                kind: object.kind.clone(),
                position: object.position,
            })
            .collect()
    }

    fn time_of_day(&self) -> f32 {
        self.time_of_day
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_are_sequential() {
        let mut registry = ObjectRegistry::new();
        let a = registry.add("box", Vec3::ZERO);
        let b = registry.add("box", Vec3::ZERO);
        assert_eq!(a, ObjectId(1));
        assert_eq!(b, ObjectId(2));
    }

    #[test]
    fn removed_object_reads_as_missing() {
        let mut registry = ObjectRegistry::new();
        let id = registry.add("model", Vec3::new(1.0, 0.0, 1.0));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.position(id), None);
        assert!(!registry.set_position(id, Vec3::ZERO));
    }

    #[test]
    fn objects_within_is_boundary_inclusive() {
        let mut registry = ObjectRegistry::new();
        let near = registry.add("tree", Vec3::new(3.0, 0.0, 4.0));
        registry.add("tree", Vec3::new(6.0, 0.0, 0.0));
        let found = registry.objects_within(Vec3::ZERO, 5.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near);
        assert_eq!(found[0].kind, "tree");
    }

    #[test]
    fn time_of_day_wraps_daily() {
        let mut registry = ObjectRegistry::new();
        registry.set_time_of_day(86_399.0);
        registry.advance_time(2.0);
        assert!((registry.time_of_day() - 1.0).abs() < 1e-2);
    }
}
