use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use super::math::Vec3;
use super::world::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorCategory {
    Aggressive,
    Passive,
    Friendly,
}

impl BehaviorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aggressive => "Aggressive",
            Self::Passive => "Passive",
            Self::Friendly => "Friendly",
        }
    }
}

impl FromStr for BehaviorCategory {
    type Err = UnknownNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Aggressive" => Ok(Self::Aggressive),
            "Passive" => Ok(Self::Passive),
            "Friendly" => Ok(Self::Friendly),
            _ => Err(UnknownNameError {
                kind: "behavior category",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EntityState {
    #[default]
    Idle,
    Moving,
    Attacking,
    Fleeing,
    Dead,
}

impl EntityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Moving => "Moving",
            Self::Attacking => "Attacking",
            Self::Fleeing => "Fleeing",
            Self::Dead => "Dead",
        }
    }

    pub fn is_travelling(self) -> bool {
        matches!(self, Self::Moving | Self::Fleeing)
    }
}

impl FromStr for EntityState {
    type Err = UnknownNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Idle" => Ok(Self::Idle),
            "Moving" => Ok(Self::Moving),
            "Attacking" => Ok(Self::Attacking),
            "Fleeing" => Ok(Self::Fleeing),
            "Dead" => Ok(Self::Dead),
            _ => Err(UnknownNameError {
                kind: "entity state",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownNameError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Clone)]
pub enum EffectKind {
    /// Applied every tick while the effect is active; negative values damage.
    HealthDelta(f32),
    Custom(Rc<dyn Fn(&mut Entity)>),
}

impl fmt::Debug for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HealthDelta(delta) => f.debug_tuple("HealthDelta").field(delta).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Effect {
    pub name: String,
    pub remaining_seconds: f32,
    pub kind: EffectKind,
}

impl Effect {
    pub fn new(name: impl Into<String>, duration_seconds: f32, kind: EffectKind) -> Self {
        Self {
            name: name.into(),
            remaining_seconds: duration_seconds,
            kind,
        }
    }

    fn apply(&self, entity: &mut Entity) {
        match &self.kind {
            EffectKind::HealthDelta(delta) if *delta < 0.0 => {
                entity.take_damage(-delta);
            }
            EffectKind::HealthDelta(delta) => entity.heal(*delta),
            EffectKind::Custom(apply) => apply(entity),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpawn {
    pub name: String,
    pub behavior: BehaviorCategory,
    pub object_id: ObjectId,
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub detection_radius: f32,
    pub script: Option<String>,
    pub wander_radius: Option<f32>,
    pub max_force: Option<f32>,
}

impl EntitySpawn {
    pub fn new(
        name: impl Into<String>,
        behavior: BehaviorCategory,
        object_id: ObjectId,
        health: f32,
        damage: f32,
        speed: f32,
        detection_radius: f32,
    ) -> Self {
        Self {
            name: name.into(),
            behavior,
            object_id,
            health,
            damage,
            speed,
            detection_radius,
            script: None,
            wander_radius: None,
            max_force: None,
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        let script = script.into();
        self.script = (!script.is_empty()).then_some(script);
        self
    }

    pub fn with_wander_radius(mut self, wander_radius: f32) -> Self {
        self.wander_radius = Some(wander_radius);
        self
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = Some(max_force);
        self
    }
}

/// Point-in-time copy of an entity's public state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub id: EntityId,
    pub name: String,
    pub behavior: BehaviorCategory,
    pub state: EntityState,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub damage: f32,
    pub speed: f32,
}

#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    name: String,
    behavior: BehaviorCategory,
    state: EntityState,
    health: f32,
    max_health: f32,
    damage: f32,
    speed: f32,
    max_speed: f32,
    max_force: f32,
    detection_radius: f32,
    wander_radius: f32,
    home_position: Vec3,
    waypoints: Vec<Vec3>,
    current_waypoint: usize,
    path: VecDeque<Vec3>,
    velocity: Vec3,
    effects: Vec<Effect>,
    object_id: ObjectId,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        spawn: EntitySpawn,
        home_position: Vec3,
        default_wander_radius: f32,
        default_max_force: f32,
    ) -> Self {
        let max_health = spawn.health.max(0.0);
        let speed = spawn.speed.max(0.0);
        Self {
            id,
            name: spawn.name,
            behavior: spawn.behavior,
            state: EntityState::Idle,
            health: max_health,
            max_health,
            damage: spawn.damage.max(0.0),
            speed,
            max_speed: speed,
            max_force: spawn.max_force.unwrap_or(default_max_force).max(0.0),
            detection_radius: spawn.detection_radius.max(0.0),
            wander_radius: spawn.wander_radius.unwrap_or(default_wander_radius).max(0.0),
            home_position,
            waypoints: Vec::new(),
            current_waypoint: 0,
            path: VecDeque::new(),
            velocity: Vec3::ZERO,
            effects: Vec::new(),
            object_id: spawn.object_id,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn behavior(&self) -> BehaviorCategory {
        self.behavior
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_dead(&self) -> bool {
        self.state == EntityState::Dead
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn damage(&self) -> f32 {
        self.damage
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn detection_radius(&self) -> f32 {
        self.detection_radius
    }

    pub fn wander_radius(&self) -> f32 {
        self.wander_radius
    }

    pub fn home_position(&self) -> Vec3 {
        self.home_position
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    pub fn current_waypoint_index(&self) -> usize {
        self.current_waypoint
    }

    pub fn path(&self) -> &VecDeque<Vec3> {
        &self.path
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn info(&self, position: Vec3) -> EntityInfo {
        EntityInfo {
            id: self.id,
            name: self.name.clone(),
            behavior: self.behavior,
            state: self.state,
            position,
            health: self.health,
            max_health: self.max_health,
            damage: self.damage,
            speed: self.speed,
        }
    }

    /// Returns false when the entity is dead; nothing leaves `Dead`.
    pub fn set_state(&mut self, state: EntityState) -> bool {
        if self.is_dead() {
            return false;
        }
        self.state = state;
        true
    }

    /// Returns true when this hit killed the entity.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if self.is_dead() || !amount.is_finite() || amount <= 0.0 {
            return false;
        }
        self.health = (self.health - amount).clamp(0.0, self.max_health);
        if self.health <= 0.0 {
            self.state = EntityState::Dead;
            self.path.clear();
            self.velocity = Vec3::ZERO;
            return true;
        }
        false
    }

    pub fn heal(&mut self, amount: f32) {
        if self.is_dead() || !amount.is_finite() || amount <= 0.0 {
            return;
        }
        self.health = (self.health + amount).clamp(0.0, self.max_health);
    }

    pub fn set_max_speed(&mut self, max_speed: f32) {
        if max_speed.is_finite() {
            self.max_speed = max_speed.max(0.0);
        }
    }

    pub fn set_max_force(&mut self, max_force: f32) {
        if max_force.is_finite() {
            self.max_force = max_force.max(0.0);
        }
    }

    pub fn set_wander_radius(&mut self, wander_radius: f32) {
        if wander_radius.is_finite() {
            self.wander_radius = wander_radius.max(0.0);
        }
    }

    pub(crate) fn set_home_position(&mut self, home_position: Vec3) {
        self.home_position = home_position;
    }

    pub(crate) fn set_waypoints(&mut self, waypoints: Vec<Vec3>) {
        self.waypoints = waypoints;
        self.current_waypoint = 0;
    }

    pub(crate) fn add_waypoint(&mut self, waypoint: Vec3) {
        self.waypoints.push(waypoint);
    }

    pub(crate) fn clear_waypoints(&mut self) {
        self.waypoints.clear();
        self.current_waypoint = 0;
    }

    pub(crate) fn set_current_waypoint_index(&mut self, index: usize) {
        self.current_waypoint = if self.waypoints.is_empty() {
            0
        } else {
            index % self.waypoints.len()
        };
    }

    pub(crate) fn replace_path(&mut self, path: VecDeque<Vec3>) {
        self.path = path;
    }

    pub(crate) fn clear_path(&mut self) {
        self.path.clear();
    }

    pub(crate) fn path_mut(&mut self) -> &mut VecDeque<Vec3> {
        &mut self.path
    }

    pub(crate) fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    pub(crate) fn add_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Decrements every effect by `dt_seconds`, drops the expired ones and
    /// applies the survivors once.
    pub(crate) fn tick_effects(&mut self, dt_seconds: f32) -> usize {
        if self.effects.is_empty() {
            return 0;
        }
        let mut effects = std::mem::take(&mut self.effects);
        let mut expired = 0usize;
        let mut index = effects.len();
        while index > 0 {
            index -= 1;
            effects[index].remaining_seconds -= dt_seconds;
            if effects[index].remaining_seconds <= 0.0 {
                effects.remove(index);
                expired += 1;
            } else if !self.is_dead() {
                effects[index].apply(self);
            }
        }
        effects.append(&mut self.effects);
        self.effects = effects;
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entity(health: f32) -> Entity {
        Entity::new(
            EntityId(7),
            EntitySpawn::new(
                "Wolf",
                BehaviorCategory::Aggressive,
                ObjectId(1),
                health,
                5.0,
                4.0,
                12.0,
            ),
            Vec3::new(1.0, 0.0, 2.0),
            10.0,
            10.0,
        )
    }

    #[test]
    fn spawn_defaults_follow_speed_and_config() {
        let entity = sample_entity(50.0);
        assert_eq!(entity.state(), EntityState::Idle);
        assert_eq!(entity.health(), 50.0);
        assert_eq!(entity.max_health(), 50.0);
        assert_eq!(entity.max_speed(), 4.0);
        assert_eq!(entity.max_force(), 10.0);
        assert_eq!(entity.wander_radius(), 10.0);
        assert_eq!(entity.home_position(), Vec3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn lethal_damage_clamps_to_zero_and_kills() {
        let mut entity = sample_entity(10.0);
        assert!(entity.take_damage(25.0));
        assert_eq!(entity.health(), 0.0);
        assert!(entity.is_dead());
    }

    #[test]
    fn dead_is_terminal_for_state_and_health() {
        let mut entity = sample_entity(10.0);
        entity.take_damage(10.0);
        assert!(!entity.set_state(EntityState::Idle));
        entity.heal(5.0);
        assert!(!entity.take_damage(1.0));
        assert_eq!(entity.health(), 0.0);
        assert_eq!(entity.state(), EntityState::Dead);
    }

    #[test]
    fn heal_clamps_to_max_health() {
        let mut entity = sample_entity(20.0);
        entity.take_damage(15.0);
        entity.heal(100.0);
        assert_eq!(entity.health(), 20.0);
    }

    #[test]
    fn expired_effects_are_removed_without_applying() {
        let mut entity = sample_entity(100.0);
        entity.add_effect(Effect::new("poison", 1.0, EffectKind::HealthDelta(-10.0)));
        assert_eq!(entity.tick_effects(0.5), 0);
        assert_eq!(entity.health(), 90.0);
        assert_eq!(entity.tick_effects(0.5), 1);
        assert_eq!(entity.health(), 90.0);
        assert!(entity.effects().is_empty());
    }

    #[test]
    fn custom_effect_runs_against_entity() {
        let mut entity = sample_entity(100.0);
        entity.add_effect(Effect::new(
            "haste",
            2.0,
            EffectKind::Custom(Rc::new(|entity: &mut Entity| {
                let boosted = entity.speed() * 2.0;
                entity.set_max_speed(boosted);
            })),
        ));
        entity.tick_effects(0.1);
        assert_eq!(entity.max_speed(), 8.0);
        assert_eq!(entity.effects().len(), 1);
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for state in [
            EntityState::Idle,
            EntityState::Moving,
            EntityState::Attacking,
            EntityState::Fleeing,
            EntityState::Dead,
        ] {
            assert_eq!(state.as_str().parse::<EntityState>(), Ok(state));
        }
        assert!("Sleeping".parse::<EntityState>().is_err());
        assert_eq!(
            "Passive".parse::<BehaviorCategory>(),
            Ok(BehaviorCategory::Passive)
        );
    }
}
