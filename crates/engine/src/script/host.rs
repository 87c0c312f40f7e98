use tracing::{info, warn};

use crate::dialogue::{DialogueError, DialogueId, NodeId};
use crate::sim::entity::{BehaviorCategory, Entity, EntityId, EntityInfo, EntityState};
use crate::sim::manager::AgentManager;
use crate::sim::math::Vec3;
use crate::sim::world::{NearbyObject, ObjectId, WorldObjects};

use super::ScriptApi;

/// Binds the manager to the entity whose hook is running.
pub(crate) struct ScriptHost<'m, W: WorldObjects> {
    manager: &'m mut AgentManager<W>,
    entity_id: EntityId,
}

impl<'m, W: WorldObjects> ScriptHost<'m, W> {
    pub(crate) fn new(manager: &'m mut AgentManager<W>, entity_id: EntityId) -> Self {
        Self {
            manager,
            entity_id,
        }
    }

    fn read<T: Default>(&self, read: impl FnOnce(&Entity) -> T) -> T {
        self.manager
            .entity(self.entity_id)
            .map(read)
            .unwrap_or_default()
    }
}

impl<W: WorldObjects> ScriptApi for ScriptHost<'_, W> {
    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn position(&self) -> Vec3 {
        self.manager
            .entity_position(self.entity_id)
            .unwrap_or(Vec3::ZERO)
    }

    fn health(&self) -> f32 {
        self.read(Entity::health)
    }

    fn max_health(&self) -> f32 {
        self.read(Entity::max_health)
    }

    fn damage(&self) -> f32 {
        self.read(Entity::damage)
    }

    fn speed(&self) -> f32 {
        self.read(Entity::speed)
    }

    fn state(&self) -> EntityState {
        self.read(Entity::state)
    }

    fn behavior(&self) -> BehaviorCategory {
        self.manager
            .entity(self.entity_id)
            .map(Entity::behavior)
            .unwrap_or(BehaviorCategory::Passive)
    }

    fn object_id(&self) -> ObjectId {
        self.manager
            .entity(self.entity_id)
            .map(Entity::object_id)
            .unwrap_or(ObjectId(0))
    }

    fn velocity(&self) -> Vec3 {
        self.read(Entity::velocity)
    }

    fn set_waypoints(&mut self, waypoints: Vec<Vec3>) {
        self.manager.set_waypoints(self.entity_id, waypoints);
    }

    fn add_waypoint(&mut self, waypoint: Vec3) {
        self.manager.add_waypoint(self.entity_id, waypoint);
    }

    fn clear_waypoints(&mut self) {
        self.manager.clear_waypoints(self.entity_id);
    }

    fn move_towards(&mut self, target: Vec3) -> bool {
        self.manager.move_towards(self.entity_id, target)
    }

    fn set_max_speed(&mut self, max_speed: f32) {
        self.manager.set_max_speed(self.entity_id, max_speed);
    }

    fn set_max_force(&mut self, max_force: f32) {
        self.manager.set_max_force(self.entity_id, max_force);
    }

    fn attack(&mut self, target: EntityId) -> bool {
        self.manager.attack(self.entity_id, target)
    }

    fn heal(&mut self, amount: f32) {
        self.manager.heal(self.entity_id, amount);
    }

    fn set_state(&mut self, state_name: &str) -> bool {
        match state_name.parse::<EntityState>() {
            Ok(state) => self.manager.set_state(self.entity_id, state),
            Err(error) => {
                warn!(entity_id = self.entity_id.0, error = %error, "script_state_rejected");
                false
            }
        }
    }

    fn find_nearest(&self, category: BehaviorCategory) -> Option<EntityId> {
        self.manager.find_nearest_entity(self.entity_id, category)
    }

    fn distance_to(&self, other: EntityId) -> Option<f32> {
        self.manager.distance_between(self.entity_id, other)
    }

    fn nearby_objects(&self, radius: f32) -> Vec<NearbyObject> {
        self.manager.world().objects_within(self.position(), radius)
    }

    fn nearby_entities(&self, radius: f32) -> Vec<EntityId> {
        let mut found = self.manager.entities_within(self.position(), radius);
        found.retain(|id| *id != self.entity_id);
        found
    }

    fn entity_info(&self, id: EntityId) -> Option<EntityInfo> {
        self.manager.entity_info(id)
    }

    fn player_position(&self) -> Option<Vec3> {
        self.manager.player_position()
    }

    fn time_of_day(&self) -> f32 {
        self.manager.world().time_of_day()
    }

    fn terrain_height(&self, x: f32, z: f32) -> f32 {
        self.manager.world().terrain_height(x, z)
    }

    fn line_of_sight(&self, target: Vec3) -> bool {
        self.manager.world().line_of_sight(self.position(), target)
    }

    fn create_dialogue(&mut self, name: &str) -> DialogueId {
        self.manager.dialogues_mut().create_dialogue(name)
    }

    fn clone_dialogue(&mut self, source: DialogueId) -> Result<DialogueId, DialogueError> {
        self.manager.dialogues_mut().clone_dialogue(source)
    }

    fn remove_dialogue(&mut self, id: DialogueId) -> Result<(), DialogueError> {
        self.manager.remove_dialogue(id)
    }

    fn add_dialogue_node(
        &mut self,
        id: DialogueId,
        node: NodeId,
        text: &str,
    ) -> Result<(), DialogueError> {
        self.manager.dialogues_mut().add_node(id, node, text)
    }

    fn update_dialogue_node(
        &mut self,
        id: DialogueId,
        node: NodeId,
        text: &str,
    ) -> Result<(), DialogueError> {
        self.manager.dialogues_mut().update_node_text(id, node, text)
    }

    fn remove_dialogue_node(&mut self, id: DialogueId, node: NodeId) -> Result<(), DialogueError> {
        self.manager.dialogues_mut().remove_node(id, node)
    }

    fn add_dialogue_option(
        &mut self,
        id: DialogueId,
        node: NodeId,
        text: &str,
        next_node: NodeId,
    ) -> Result<(), DialogueError> {
        self.manager
            .dialogues_mut()
            .add_option(id, node, text, next_node, None)
    }

    fn update_dialogue_option(
        &mut self,
        id: DialogueId,
        node: NodeId,
        index: usize,
        text: &str,
    ) -> Result<(), DialogueError> {
        self.manager
            .dialogues_mut()
            .update_option_text(id, node, index, text)
    }

    fn remove_dialogue_option(
        &mut self,
        id: DialogueId,
        node: NodeId,
        index: usize,
    ) -> Result<(), DialogueError> {
        self.manager.dialogues_mut().remove_option(id, node, index)
    }

    fn associate_dialogue(&mut self, id: DialogueId) -> bool {
        self.manager.associate_dialogue(self.entity_id, id)
    }

    fn disassociate_dialogue(&mut self) {
        self.manager.remove_dialogue_from(self.entity_id);
    }

    fn dialogue_id(&self) -> Option<DialogueId> {
        self.manager.dialogue_id_of(self.entity_id)
    }

    fn trigger_dialogue(&mut self, start_node: NodeId) -> bool {
        self.manager
            .trigger_dialogue_with_default_display(self.entity_id, start_node)
    }

    fn log(&self, message: &str) {
        info!(entity_id = self.entity_id.0, message, "script_log");
    }
}
