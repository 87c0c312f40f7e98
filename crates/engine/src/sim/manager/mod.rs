use std::collections::{HashMap, VecDeque};

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::content::AgentDef;
use crate::dialogue::{
    DialogueDisplay, DialogueError, DialogueId, DialogueStep, DialogueSystem, LogDialogueDisplay,
    NodeId,
};
use crate::nav::{NavGrid, NavGridError, OccupancyProbe, Pathfinder};
use crate::script::{
    BehaviorSource, ScriptHook, ScriptHost, ScriptLoader, ScriptedBehavior,
};

use super::behavior::{BehaviorArbiter, Decision, Perception};
use super::entity::{
    BehaviorCategory, Effect, Entity, EntityId, EntityInfo, EntitySpawn, EntityState,
};
use super::math::Vec3;
use super::steering::{follow_path, integrate, Kinematics};
use super::store::EntityStore;
use super::world::{ObjectId, WorldObjects};

/// Per-tick counters returned by [`AgentManager::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub updated: u32,
    pub scripted: u32,
    pub skipped_dead: u32,
    pub paths_found: u32,
    pub paths_failed: u32,
    pub script_faults: u32,
}

/// Owns every AI entity and drives them one tick at a time.
pub struct AgentManager<W: WorldObjects> {
    config: SimConfig,
    world: W,
    store: EntityStore,
    pathfinder: Pathfinder,
    arbiter: BehaviorArbiter,
    dialogues: DialogueSystem,
    entity_dialogues: HashMap<EntityId, DialogueId>,
    behaviors: HashMap<EntityId, BehaviorSource>,
    script_loader: Option<Box<dyn ScriptLoader>>,
    dialogue_display: Box<dyn DialogueDisplay>,
    player_id: Option<EntityId>,
    rng: Xoshiro256PlusPlus,
    elapsed_seconds: f64,
    tick_report: TickReport,
}

impl<W: WorldObjects> AgentManager<W> {
    pub fn new(
        config: SimConfig,
        world: W,
        probe: &dyn OccupancyProbe,
    ) -> Result<Self, NavGridError> {
        let config = config.validated();
        let grid = NavGrid::new(config.world_extent(), config.node_radius, probe)?;
        let (size_x, size_y, size_z) = grid.size();
        info!(
            size_x,
            size_y,
            size_z,
            node_radius = config.node_radius,
            rng_seed = config.rng_seed,
            "agent_manager_created"
        );
        Ok(Self {
            arbiter: BehaviorArbiter::new(config.arbiter_rules()),
            rng: Xoshiro256PlusPlus::seed_from_u64(config.rng_seed),
            pathfinder: Pathfinder::new(grid),
            config,
            world,
            store: EntityStore::new(),
            dialogues: DialogueSystem::new(),
            entity_dialogues: HashMap::new(),
            behaviors: HashMap::new(),
            script_loader: None,
            dialogue_display: Box::new(LogDialogueDisplay),
            player_id: None,
            elapsed_seconds: 0.0,
            tick_report: TickReport::default(),
        })
    }

    pub fn with_script_loader(mut self, loader: Box<dyn ScriptLoader>) -> Self {
        self.script_loader = Some(loader);
        self
    }

    pub fn set_script_loader(&mut self, loader: Box<dyn ScriptLoader>) {
        self.script_loader = Some(loader);
    }

    /// Display used when scripts trigger dialogue.
    pub fn set_dialogue_display(&mut self, display: Box<dyn DialogueDisplay>) {
        self.dialogue_display = display;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    pub fn dialogues(&self) -> &DialogueSystem {
        &self.dialogues
    }

    pub fn dialogues_mut(&mut self) -> &mut DialogueSystem {
        &mut self.dialogues
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    // Lifecycle

    /// Registers an entity and, when it names a script, binds the script and
    /// runs its init hook. A script that cannot be loaded leaves the entity on
    /// the default arbiter.
    pub fn create_entity(&mut self, spawn: EntitySpawn) -> EntityId {
        let home = self.world.position(spawn.object_id).unwrap_or(Vec3::ZERO);
        let script = spawn.script.clone();
        let id = self.store.create(
            spawn,
            home,
            self.config.default_wander_radius,
            self.config.default_max_force,
        );
        if let Some(entity) = self.store.get(id) {
            info!(
                entity_id = id.0,
                name = entity.name(),
                behavior = entity.behavior().as_str(),
                object_id = entity.object_id().0,
                "entity_spawned"
            );
        }

        let source = match script {
            Some(name) => self.load_script(id, &name),
            None => BehaviorSource::DefaultArbiter,
        };
        let scripted = source.is_scripted();
        self.behaviors.insert(id, source);
        if scripted {
            self.run_script_hook(id, ScriptHook::Init);
        }
        id
    }

    pub fn spawn_from_def(&mut self, def: &AgentDef, object_id: ObjectId) -> EntityId {
        self.create_entity(def.to_spawn(object_id))
    }

    /// Removes the entity, running its script's end hook first. Removing an
    /// unknown id only repeats the cleanup.
    pub fn destroy_entity(&mut self, id: EntityId) {
        if self.store.contains(id) {
            if matches!(self.behaviors.get(&id), Some(BehaviorSource::Scripted(_))) {
                self.run_script_hook(id, ScriptHook::End);
            }
            if self.store.remove(id).is_some() {
                info!(entity_id = id.0, "entity_destroyed");
            }
        }
        self.behaviors.remove(&id);
        self.entity_dialogues.remove(&id);
        if self.player_id == Some(id) {
            self.player_id = None;
        }
    }

    /// Removes a dead entity together with its world object.
    pub fn handle_entity_death(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.store.get(id) else {
            return false;
        };
        if !entity.is_dead() {
            return false;
        }
        let object_id = entity.object_id();
        self.world.remove(object_id);
        self.destroy_entity(id);
        true
    }

    pub fn set_player(&mut self, id: EntityId) -> bool {
        if !self.store.contains(id) {
            return false;
        }
        self.player_id = Some(id);
        true
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    pub fn player_position(&self) -> Option<Vec3> {
        self.player_id.and_then(|id| self.entity_position(id))
    }

    // Queries

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.store.get(id)
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.store.ids()
    }

    pub fn entity_count(&self) -> usize {
        self.store.len()
    }

    pub fn behavior_source(&self, id: EntityId) -> Option<&BehaviorSource> {
        self.behaviors.get(&id)
    }

    pub fn entity_position(&self, id: EntityId) -> Option<Vec3> {
        self.store.get(id).map(|entity| self.position_of(entity))
    }

    pub fn entity_velocity(&self, id: EntityId) -> Option<Vec3> {
        self.store.get(id).map(Entity::velocity)
    }

    pub fn entity_info(&self, id: EntityId) -> Option<EntityInfo> {
        let entity = self.store.get(id)?;
        Some(entity.info(self.position_of(entity)))
    }

    pub fn find_nearest_entity(
        &self,
        id: EntityId,
        category: BehaviorCategory,
    ) -> Option<EntityId> {
        self.store
            .find_nearest(
                id,
                |entity| self.position_of(entity),
                |entity| entity.behavior() == category,
            )
            .map(|(nearest, _)| nearest)
    }

    pub fn distance_between(&self, a: EntityId, b: EntityId) -> Option<f32> {
        let a = self.entity_position(a)?;
        let b = self.entity_position(b)?;
        Some(a.distance(b))
    }

    pub fn entities_within(&self, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.store
            .entities_within(point, radius, |entity| self.position_of(entity))
    }

    // Commands

    pub fn set_waypoints(&mut self, id: EntityId, waypoints: Vec<Vec3>) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.set_waypoints(waypoints);
        }
    }

    pub fn add_waypoint(&mut self, id: EntityId, waypoint: Vec3) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.add_waypoint(waypoint);
        }
    }

    pub fn clear_waypoints(&mut self, id: EntityId) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.clear_waypoints();
        }
    }

    pub fn set_max_speed(&mut self, id: EntityId, max_speed: f32) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.set_max_speed(max_speed);
        }
    }

    pub fn set_max_force(&mut self, id: EntityId, max_force: f32) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.set_max_force(max_force);
        }
    }

    pub fn set_wander_radius(&mut self, id: EntityId, wander_radius: f32) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.set_wander_radius(wander_radius);
        }
    }

    /// Moves the point wandering is centred on.
    pub fn set_home_position(&mut self, id: EntityId, home_position: Vec3) {
        if let Some(entity) = self.store.get_mut(id) {
            entity.set_home_position(home_position);
        }
    }

    pub fn set_state(&mut self, id: EntityId, state: EntityState) -> bool {
        let Some(entity) = self.store.get_mut(id) else {
            return false;
        };
        entity.set_state(state)
    }

    pub fn apply_effect(&mut self, id: EntityId, effect: Effect) -> bool {
        let Some(entity) = self.store.get_mut(id) else {
            return false;
        };
        if entity.is_dead() {
            return false;
        }
        debug!(entity_id = id.0, effect = %effect.name, "effect_applied");
        entity.add_effect(effect);
        true
    }

    pub fn heal(&mut self, id: EntityId, amount: f32) -> bool {
        let Some(entity) = self.store.get_mut(id) else {
            return false;
        };
        let before = entity.health();
        entity.heal(amount);
        entity.health() > before
    }

    /// Deals the attacker's damage to the target. Range is not checked.
    pub fn attack(&mut self, attacker: EntityId, target: EntityId) -> bool {
        let Some(damage) = self.store.get(attacker).map(Entity::damage) else {
            return false;
        };
        let Some(victim) = self.store.get_mut(target) else {
            return false;
        };
        if victim.is_dead() {
            return false;
        }
        let killed = victim.take_damage(damage);
        debug!(
            attacker_id = attacker.0,
            target_id = target.0,
            damage,
            remaining_health = victim.health(),
            "entity_attacked"
        );
        if killed {
            info!(attacker_id = attacker.0, target_id = target.0, "entity_killed");
        }
        true
    }

    /// Marks the entity as moving and replaces its path with a fresh search.
    /// When no path exists the entity keeps no path and will not move.
    pub fn move_towards(&mut self, id: EntityId, target: Vec3) -> bool {
        let Some(entity) = self.store.get(id) else {
            return false;
        };
        if entity.is_dead() {
            return false;
        }
        let start = self.position_of(entity);
        let path = self.pathfinder.find_path(start, target);
        let Some(entity) = self.store.get_mut(id) else {
            return false;
        };
        entity.set_state(EntityState::Moving);
        match path {
            Some(path) => {
                debug!(entity_id = id.0, waypoints = path.len(), "path_found");
                entity.replace_path(VecDeque::from(path));
                self.tick_report.paths_found += 1;
                true
            }
            None => {
                debug!(
                    entity_id = id.0,
                    target_x = target.x,
                    target_y = target.y,
                    target_z = target.z,
                    "path_not_found"
                );
                entity.clear_path();
                self.tick_report.paths_failed += 1;
                false
            }
        }
    }

    // Dialogue linkage

    /// Links a dialogue to an entity. Does nothing unless both ids resolve.
    pub fn associate_dialogue(&mut self, id: EntityId, dialogue: DialogueId) -> bool {
        if !self.store.contains(id) || !self.dialogues.contains(dialogue) {
            return false;
        }
        self.entity_dialogues.insert(id, dialogue);
        true
    }

    pub fn remove_dialogue_from(&mut self, id: EntityId) {
        self.entity_dialogues.remove(&id);
    }

    pub fn dialogue_id_of(&self, id: EntityId) -> Option<DialogueId> {
        self.entity_dialogues.get(&id).copied()
    }

    /// Removes a dialogue and every entity link to it.
    pub fn remove_dialogue(&mut self, dialogue: DialogueId) -> Result<(), DialogueError> {
        self.dialogues.remove_dialogue(dialogue)?;
        self.entity_dialogues.retain(|_, linked| *linked != dialogue);
        Ok(())
    }

    /// Shows the entity's linked dialogue at `start_node`. Returns false when
    /// the entity has no dialogue or the node does not exist.
    pub fn trigger_dialogue(
        &self,
        id: EntityId,
        start_node: NodeId,
        display: &mut dyn DialogueDisplay,
    ) -> bool {
        present_node(&self.dialogues, &self.entity_dialogues, id, start_node, display)
    }

    /// Applies one option selection for the entity's dialogue and shows the
    /// next node when the conversation continues.
    pub fn handle_dialogue_option(
        &self,
        id: EntityId,
        node: NodeId,
        option_index: usize,
        display: &mut dyn DialogueDisplay,
    ) -> Result<DialogueStep, DialogueError> {
        let Some(dialogue) = self.dialogue_id_of(id) else {
            return Ok(DialogueStep::Ended);
        };
        let step = self.dialogues.select_option(dialogue, node, option_index)?;
        if let DialogueStep::Advanced(next) = step {
            present_node(&self.dialogues, &self.entity_dialogues, id, next, display);
        }
        Ok(step)
    }

    pub(crate) fn trigger_dialogue_with_default_display(
        &mut self,
        id: EntityId,
        start_node: NodeId,
    ) -> bool {
        present_node(
            &self.dialogues,
            &self.entity_dialogues,
            id,
            start_node,
            self.dialogue_display.as_mut(),
        )
    }

    // Tick

    pub fn update(&mut self, dt_seconds: f32) -> TickReport {
        self.tick_report = TickReport::default();
        if !dt_seconds.is_finite() || dt_seconds < 0.0 {
            warn!(dt_seconds, "tick_skipped_invalid_dt");
            return self.tick_report;
        }
        self.elapsed_seconds += f64::from(dt_seconds);

        for id in self.store.ids() {
            let Some(entity) = self.store.get_mut(id) else {
                continue;
            };
            if entity.is_dead() {
                self.tick_report.skipped_dead += 1;
                continue;
            }

            entity.tick_effects(dt_seconds);
            if entity.is_dead() {
                info!(entity_id = id.0, "entity_died_from_effect");
                continue;
            }

            if matches!(self.behaviors.get(&id), Some(BehaviorSource::Scripted(_))) {
                self.tick_report.scripted += 1;
                self.run_script_hook(id, ScriptHook::Main);
            } else {
                self.run_arbiter(id);
            }

            let travelling = self
                .store
                .get(id)
                .is_some_and(|entity| entity.state().is_travelling());
            if travelling {
                self.step_movement(id, dt_seconds);
            }
            if self.store.contains(id) {
                self.tick_report.updated += 1;
            }
        }

        self.tick_report
    }

    fn run_arbiter(&mut self, id: EntityId) {
        let decision = {
            let view = ArbiterView {
                store: &self.store,
                world: &self.world,
                grid: self.pathfinder.grid(),
                player_id: self.player_id,
            };
            self.arbiter.decide(id, &view, &mut self.rng)
        };
        self.apply_decision(id, decision);
    }

    fn apply_decision(&mut self, id: EntityId, decision: Decision) {
        match decision {
            Decision::Attack { target } => {
                self.transition(id, EntityState::Attacking);
                self.attack(id, target);
            }
            Decision::Pursue { destination, .. }
            | Decision::Follow { destination, .. }
            | Decision::Wander { destination } => {
                self.transition(id, EntityState::Moving);
                self.move_towards(id, destination);
            }
            Decision::Flee { destination, .. } => {
                self.move_towards(id, destination);
                self.transition(id, EntityState::Fleeing);
            }
            Decision::Patrol {
                waypoint_index,
                destination,
            } => {
                if let Some(entity) = self.store.get_mut(id) {
                    entity.set_current_waypoint_index(waypoint_index);
                }
                self.transition(id, EntityState::Moving);
                self.move_towards(id, destination);
            }
            Decision::Hold => {}
        }
    }

    fn transition(&mut self, id: EntityId, state: EntityState) {
        let Some(entity) = self.store.get_mut(id) else {
            return;
        };
        let previous = entity.state();
        if previous != state && entity.set_state(state) {
            debug!(
                entity_id = id.0,
                from = previous.as_str(),
                to = state.as_str(),
                "entity_state_changed"
            );
        }
    }

    fn step_movement(&mut self, id: EntityId, dt_seconds: f32) {
        let Some(entity) = self.store.get(id) else {
            return;
        };
        let position = self.position_of(entity);
        let arrival_radius = self.config.path_arrival_radius;
        let Some(entity) = self.store.get_mut(id) else {
            return;
        };
        if entity.path().is_empty() {
            self.transition(id, EntityState::Idle);
            return;
        }

        let velocity = entity.velocity();
        let max_speed = entity.max_speed();
        let max_force = entity.max_force();
        let steering = follow_path(
            entity.path_mut(),
            position,
            velocity,
            max_speed,
            max_force,
            arrival_radius,
        );
        let next = integrate(
            Kinematics { position, velocity },
            steering.force(),
            max_speed,
            dt_seconds,
        );
        entity.set_velocity(next.velocity);
        let object_id = entity.object_id();
        let path_consumed = entity.path().is_empty();
        self.world.set_position(object_id, next.position);
        if path_consumed {
            self.transition(id, EntityState::Idle);
        }
    }

    // Scripts

    fn load_script(&mut self, id: EntityId, name: &str) -> BehaviorSource {
        let Some(loader) = self.script_loader.as_mut() else {
            warn!(
                entity_id = id.0,
                script = name,
                "script_loader_missing_using_default_behavior"
            );
            return BehaviorSource::DefaultArbiter;
        };
        match loader.load(name) {
            Ok(runtime) => {
                info!(entity_id = id.0, script = name, "script_bound");
                BehaviorSource::Scripted(ScriptedBehavior::new(name, runtime))
            }
            Err(error) => {
                warn!(
                    entity_id = id.0,
                    script = name,
                    error = %error,
                    "script_load_failed_using_default_behavior"
                );
                BehaviorSource::DefaultArbiter
            }
        }
    }

    /// Runs one hook with the script detached from the behavior table so it
    /// can call back into the manager. Faults are logged and counted, never
    /// propagated into the tick.
    fn run_script_hook(&mut self, id: EntityId, hook: ScriptHook) {
        let Some(slot) = self.behaviors.get_mut(&id) else {
            return;
        };
        let BehaviorSource::Scripted(mut script) = std::mem::take(slot) else {
            return;
        };

        if let Err(error) = script.run(hook, &mut ScriptHost::new(self, id)) {
            self.tick_report.script_faults += 1;
            warn!(
                entity_id = id.0,
                script = script.name(),
                hook = hook.as_str(),
                error = %error,
                "script_hook_failed"
            );
        }

        if let Some(slot) = self.behaviors.get_mut(&id) {
            *slot = BehaviorSource::Scripted(script);
        }
    }

    fn position_of(&self, entity: &Entity) -> Vec3 {
        self.world
            .position(entity.object_id())
            .unwrap_or(Vec3::ZERO)
    }
}

fn present_node(
    dialogues: &DialogueSystem,
    links: &HashMap<EntityId, DialogueId>,
    id: EntityId,
    node: NodeId,
    display: &mut dyn DialogueDisplay,
) -> bool {
    let Some(dialogue) = links.get(&id).copied() else {
        return false;
    };
    let Some(node) = dialogues.node(dialogue, node) else {
        debug!(entity_id = id.0, dialogue_id = dialogue.0, node, "dialogue_node_missing");
        return false;
    };
    display.show(&node.text, &node.option_texts());
    true
}

struct ArbiterView<'a, W: WorldObjects> {
    store: &'a EntityStore,
    world: &'a W,
    grid: &'a NavGrid,
    player_id: Option<EntityId>,
}

impl<W: WorldObjects> Perception for ArbiterView<'_, W> {
    fn store(&self) -> &EntityStore {
        self.store
    }

    fn position_of(&self, entity: &Entity) -> Vec3 {
        self.world
            .position(entity.object_id())
            .unwrap_or(Vec3::ZERO)
    }

    fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    fn same_cell(&self, a: Vec3, b: Vec3) -> bool {
        self.grid.node_from_world_point(a) == self.grid.node_from_world_point(b)
    }
}
