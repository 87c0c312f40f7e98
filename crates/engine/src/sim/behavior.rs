use std::f32::consts::TAU;

use rand::Rng;

use super::entity::{BehaviorCategory, Entity, EntityId, EntityState};
use super::math::Vec3;
use super::store::EntityStore;

/// Read-only view of the simulation handed to the arbiter each decision.
pub trait Perception {
    fn store(&self) -> &EntityStore;
    fn position_of(&self, entity: &Entity) -> Vec3;
    fn player_id(&self) -> Option<EntityId>;
    /// True when both points resolve to the same navigation cell.
    fn same_cell(&self, a: Vec3, b: Vec3) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Attack {
        target: EntityId,
    },
    Pursue {
        target: EntityId,
        destination: Vec3,
    },
    Flee {
        threat: EntityId,
        destination: Vec3,
    },
    Follow {
        target: EntityId,
        destination: Vec3,
    },
    Patrol {
        waypoint_index: usize,
        destination: Vec3,
    },
    Wander {
        destination: Vec3,
    },
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterRules {
    pub melee_range: f32,
    pub flee_step: f32,
    pub waypoint_tolerance: f32,
}

impl Default for ArbiterRules {
    fn default() -> Self {
        Self {
            melee_range: 2.0,
            flee_step: 10.0,
            waypoint_tolerance: 0.1,
        }
    }
}

/// Default per-tick decision policy for entities without a script.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BehaviorArbiter {
    rules: ArbiterRules,
}

impl BehaviorArbiter {
    pub fn new(rules: ArbiterRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> ArbiterRules {
        self.rules
    }

    pub fn decide<P, R>(&self, entity_id: EntityId, view: &P, rng: &mut R) -> Decision
    where
        P: Perception + ?Sized,
        R: Rng + ?Sized,
    {
        let Some(entity) = view.store().get(entity_id) else {
            return Decision::Hold;
        };
        if entity.is_dead() || view.player_id() == Some(entity_id) {
            return Decision::Hold;
        }

        match entity.behavior() {
            BehaviorCategory::Aggressive => self.decide_aggressive(entity, view, rng),
            BehaviorCategory::Passive => self.decide_passive(entity, view, rng),
            BehaviorCategory::Friendly => self.decide_friendly(entity, view, rng),
        }
    }

    fn decide_aggressive<P, R>(&self, entity: &Entity, view: &P, rng: &mut R) -> Decision
    where
        P: Perception + ?Sized,
        R: Rng + ?Sized,
    {
        let nearest = view.store().find_nearest(
            entity.id(),
            |candidate| view.position_of(candidate),
            |candidate| !candidate.is_dead() && candidate.behavior() != BehaviorCategory::Aggressive,
        );
        let Some((target, distance)) = nearest else {
            return self.wander_or_patrol(entity, view, rng);
        };
        if distance > entity.detection_radius() {
            return self.wander_or_patrol(entity, view, rng);
        }
        if distance <= self.rules.melee_range {
            return Decision::Attack { target };
        }
        let Some(target_entity) = view.store().get(target) else {
            return Decision::Hold;
        };
        Decision::Pursue {
            target,
            destination: view.position_of(target_entity),
        }
    }

    fn decide_passive<P, R>(&self, entity: &Entity, view: &P, rng: &mut R) -> Decision
    where
        P: Perception + ?Sized,
        R: Rng + ?Sized,
    {
        let nearest = view.store().find_nearest(
            entity.id(),
            |candidate| view.position_of(candidate),
            |candidate| !candidate.is_dead() && candidate.behavior() == BehaviorCategory::Aggressive,
        );
        let threat = nearest.filter(|(_, distance)| *distance <= entity.detection_radius());
        let Some((threat, _)) = threat else {
            return self.wander_or_patrol(entity, view, rng);
        };
        let Some(threat_entity) = view.store().get(threat) else {
            return Decision::Hold;
        };
        let position = view.position_of(entity);
        let away = (position - view.position_of(threat_entity)).normalized();
        Decision::Flee {
            threat,
            destination: position + away * self.rules.flee_step,
        }
    }

    fn decide_friendly<P, R>(&self, entity: &Entity, view: &P, rng: &mut R) -> Decision
    where
        P: Perception + ?Sized,
        R: Rng + ?Sized,
    {
        let player = view
            .player_id()
            .and_then(|player_id| view.store().get(player_id))
            .filter(|player| !player.is_dead());
        if let Some(player) = player {
            let player_position = view.position_of(player);
            if view.position_of(entity).distance(player_position) <= entity.detection_radius() {
                return Decision::Follow {
                    target: player.id(),
                    destination: player_position,
                };
            }
        }
        self.wander_or_patrol(entity, view, rng)
    }

    fn wander_or_patrol<P, R>(&self, entity: &Entity, view: &P, rng: &mut R) -> Decision
    where
        P: Perception + ?Sized,
        R: Rng + ?Sized,
    {
        if entity.waypoints().is_empty() {
            self.wander(entity, view, rng)
        } else {
            self.patrol(entity, view)
        }
    }

    fn patrol<P>(&self, entity: &Entity, view: &P) -> Decision
    where
        P: Perception + ?Sized,
    {
        let waypoints = entity.waypoints();
        let index = entity.current_waypoint_index() % waypoints.len();
        let waypoint = waypoints[index];
        let position = view.position_of(entity);
        let moving = entity.state() == EntityState::Moving;

        // Paths end on cell centres, so a stopped entity sharing the
        // waypoint's cell has arrived as closely as it can.
        let arrived = position.distance(waypoint) < self.rules.waypoint_tolerance
            || (!moving && view.same_cell(position, waypoint));
        if arrived {
            let next = (index + 1) % waypoints.len();
            return Decision::Patrol {
                waypoint_index: next,
                destination: waypoints[next],
            };
        }
        if moving {
            return Decision::Hold;
        }
        Decision::Patrol {
            waypoint_index: index,
            destination: waypoint,
        }
    }

    fn wander<P, R>(&self, entity: &Entity, view: &P, rng: &mut R) -> Decision
    where
        P: Perception + ?Sized,
        R: Rng + ?Sized,
    {
        let home = entity.home_position();
        let within_home = view.position_of(entity).distance(home) <= entity.wander_radius();
        if entity.state() == EntityState::Moving && within_home {
            return Decision::Hold;
        }
        Decision::Wander {
            destination: sample_wander_point(home, entity.wander_radius(), rng),
        }
    }
}

/// Point around `home` in the horizontal plane with an angle uniform in
/// [0, 2π) and a radius uniform in [0, radius], drawn independently. Samples
/// cluster toward the centre.
pub fn sample_wander_point<R>(home: Vec3, radius: f32, rng: &mut R) -> Vec3
where
    R: Rng + ?Sized,
{
    let angle = rng.gen_range(0.0..TAU);
    let distance = if radius > 0.0 {
        rng.gen_range(0.0..=radius)
    } else {
        0.0
    };
    home + Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;
    use crate::sim::entity::EntitySpawn;
    use crate::sim::world::ObjectId;

    struct Fixture {
        store: EntityStore,
        positions: HashMap<EntityId, Vec3>,
        player: Option<EntityId>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: EntityStore::new(),
                positions: HashMap::new(),
                player: None,
            }
        }

        fn spawn(&mut self, behavior: BehaviorCategory, position: Vec3, detection: f32) -> EntityId {
            let spawn = EntitySpawn::new("agent", behavior, ObjectId(0), 20.0, 5.0, 3.0, detection);
            let id = self.store.create(spawn, position, 10.0, 10.0);
            self.positions.insert(id, position);
            id
        }
    }

    impl Perception for Fixture {
        fn store(&self) -> &EntityStore {
            &self.store
        }

        fn position_of(&self, entity: &Entity) -> Vec3 {
            self.positions.get(&entity.id()).copied().unwrap_or(Vec3::ZERO)
        }

        fn player_id(&self) -> Option<EntityId> {
            self.player
        }

        fn same_cell(&self, a: Vec3, b: Vec3) -> bool {
            a.distance(b) < 0.5
        }
    }

    fn rng() -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(7)
    }

    #[test]
    fn aggressive_attacks_inside_melee_range() {
        let mut world = Fixture::new();
        let wolf = world.spawn(BehaviorCategory::Aggressive, Vec3::ZERO, 10.0);
        let sheep = world.spawn(BehaviorCategory::Passive, Vec3::new(1.5, 0.0, 0.0), 10.0);
        let decision = BehaviorArbiter::default().decide(wolf, &world, &mut rng());
        assert_eq!(decision, Decision::Attack { target: sheep });
    }

    #[test]
    fn dead_candidates_do_not_mask_live_ones() {
        let mut world = Fixture::new();
        let wolf = world.spawn(BehaviorCategory::Aggressive, Vec3::ZERO, 10.0);
        let carcass = world.spawn(BehaviorCategory::Passive, Vec3::new(0.5, 0.0, 0.0), 10.0);
        let sheep = world.spawn(BehaviorCategory::Passive, Vec3::new(1.5, 0.0, 0.0), 10.0);
        world.store.get_mut(carcass).expect("carcass").take_damage(100.0);
        let decision = BehaviorArbiter::default().decide(wolf, &world, &mut rng());
        assert_eq!(decision, Decision::Attack { target: sheep });

        world.store.get_mut(wolf).expect("wolf").take_damage(100.0);
        let flee = BehaviorArbiter::default().decide(sheep, &world, &mut rng());
        assert!(!matches!(flee, Decision::Flee { .. }), "fled from {flee:?}");
    }

    #[test]
    fn aggressive_pursues_between_melee_and_detection() {
        let mut world = Fixture::new();
        let wolf = world.spawn(BehaviorCategory::Aggressive, Vec3::ZERO, 10.0);
        let target_position = Vec3::new(6.0, 0.0, 0.0);
        let sheep = world.spawn(BehaviorCategory::Friendly, target_position, 10.0);
        let decision = BehaviorArbiter::default().decide(wolf, &world, &mut rng());
        assert_eq!(
            decision,
            Decision::Pursue {
                target: sheep,
                destination: target_position
            }
        );
    }

    #[test]
    fn aggressive_ignores_other_aggressors_and_dead_targets() {
        let mut world = Fixture::new();
        let wolf = world.spawn(BehaviorCategory::Aggressive, Vec3::ZERO, 10.0);
        world.spawn(BehaviorCategory::Aggressive, Vec3::new(1.0, 0.0, 0.0), 10.0);
        let corpse = world.spawn(BehaviorCategory::Passive, Vec3::new(1.0, 0.0, 1.0), 10.0);
        world
            .store
            .get_mut(corpse)
            .expect("corpse")
            .take_damage(100.0);
        let decision = BehaviorArbiter::default().decide(wolf, &world, &mut rng());
        assert!(matches!(decision, Decision::Wander { .. }));
    }

    #[test]
    fn passive_flees_a_fixed_step_away_from_threat() {
        let mut world = Fixture::new();
        let deer = world.spawn(BehaviorCategory::Passive, Vec3::ZERO, 8.0);
        let wolf = world.spawn(BehaviorCategory::Aggressive, Vec3::new(0.0, 0.0, 4.0), 8.0);
        let decision = BehaviorArbiter::default().decide(deer, &world, &mut rng());
        assert_eq!(
            decision,
            Decision::Flee {
                threat: wolf,
                destination: Vec3::new(0.0, 0.0, -10.0)
            }
        );
    }

    #[test]
    fn friendly_follows_player_only_inside_detection_radius() {
        let mut world = Fixture::new();
        let dog = world.spawn(BehaviorCategory::Friendly, Vec3::ZERO, 5.0);
        let player = world.spawn(BehaviorCategory::Friendly, Vec3::new(3.0, 0.0, 0.0), 5.0);
        world.player = Some(player);
        let decision = BehaviorArbiter::default().decide(dog, &world, &mut rng());
        assert_eq!(
            decision,
            Decision::Follow {
                target: player,
                destination: Vec3::new(3.0, 0.0, 0.0)
            }
        );

        world.positions.insert(player, Vec3::new(30.0, 0.0, 0.0));
        let decision = BehaviorArbiter::default().decide(dog, &world, &mut rng());
        assert!(matches!(decision, Decision::Wander { .. }));
    }

    #[test]
    fn player_and_dead_entities_hold() {
        let mut world = Fixture::new();
        let player = world.spawn(BehaviorCategory::Passive, Vec3::ZERO, 5.0);
        world.player = Some(player);
        let dead = world.spawn(BehaviorCategory::Aggressive, Vec3::ZERO, 5.0);
        world.store.get_mut(dead).expect("dead").take_damage(50.0);
        let arbiter = BehaviorArbiter::default();
        assert_eq!(arbiter.decide(player, &world, &mut rng()), Decision::Hold);
        assert_eq!(arbiter.decide(dead, &world, &mut rng()), Decision::Hold);
        assert_eq!(arbiter.decide(EntityId(99), &world, &mut rng()), Decision::Hold);
    }

    #[test]
    fn patrol_targets_current_waypoint_then_advances_cyclically() {
        let mut world = Fixture::new();
        let guard = world.spawn(BehaviorCategory::Passive, Vec3::ZERO, 1.0);
        let a = Vec3::new(5.0, 0.0, 0.0);
        let b = Vec3::new(5.0, 0.0, 5.0);
        world.store.get_mut(guard).expect("guard").set_waypoints(vec![a, b]);
        let arbiter = BehaviorArbiter::default();

        assert_eq!(
            arbiter.decide(guard, &world, &mut rng()),
            Decision::Patrol {
                waypoint_index: 0,
                destination: a
            }
        );

        world.store.get_mut(guard).expect("guard").set_state(EntityState::Moving);
        assert_eq!(arbiter.decide(guard, &world, &mut rng()), Decision::Hold);

        world.positions.insert(guard, Vec3::new(5.0, 0.0, 0.05));
        assert_eq!(
            arbiter.decide(guard, &world, &mut rng()),
            Decision::Patrol {
                waypoint_index: 1,
                destination: b
            }
        );

        let entity = world.store.get_mut(guard).expect("guard");
        entity.set_current_waypoint_index(1);
        entity.set_state(EntityState::Idle);
        world.positions.insert(guard, Vec3::new(5.2, 0.0, 4.9));
        assert_eq!(
            arbiter.decide(guard, &world, &mut rng()),
            Decision::Patrol {
                waypoint_index: 0,
                destination: a
            }
        );
    }

    #[test]
    fn moving_wanderer_inside_radius_holds() {
        let mut world = Fixture::new();
        let villager = world.spawn(BehaviorCategory::Passive, Vec3::ZERO, 1.0);
        world
            .store
            .get_mut(villager)
            .expect("villager")
            .set_state(EntityState::Moving);
        world.positions.insert(villager, Vec3::new(3.0, 0.0, 0.0));
        let arbiter = BehaviorArbiter::default();
        assert_eq!(arbiter.decide(villager, &world, &mut rng()), Decision::Hold);

        world.positions.insert(villager, Vec3::new(30.0, 0.0, 0.0));
        assert!(matches!(
            arbiter.decide(villager, &world, &mut rng()),
            Decision::Wander { .. }
        ));
    }

    #[test]
    fn wander_samples_stay_inside_radius_of_home() {
        let mut rng = rng();
        let home = Vec3::new(4.0, 1.0, -2.0);
        for _ in 0..2_000 {
            let point = sample_wander_point(home, 6.0, &mut rng);
            assert!(point.distance(home) <= 6.0 + 1e-4);
            assert_eq!(point.y, home.y);
        }
        assert_eq!(sample_wander_point(home, 0.0, &mut rng), home);
    }
}
