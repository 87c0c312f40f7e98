pub mod behavior;
pub mod entity;
pub mod manager;
pub mod math;
pub mod steering;
pub mod store;
pub mod world;

pub use behavior::{sample_wander_point, ArbiterRules, BehaviorArbiter, Decision, Perception};
pub use entity::{
    BehaviorCategory, Effect, EffectKind, Entity, EntityId, EntityInfo, EntitySpawn, EntityState,
    UnknownNameError,
};
pub use manager::{AgentManager, TickReport};
pub use math::Vec3;
pub use steering::{arrive, follow_path, integrate, seek, Kinematics, PathSteering};
pub use store::EntityStore;
pub use world::{NearbyObject, ObjectId, ObjectRegistry, WorldObject, WorldObjects};
