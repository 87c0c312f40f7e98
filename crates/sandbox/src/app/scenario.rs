use std::path::Path;

use agent_engine::{
    AgentDefDatabase, AgentManager, DialogueError, DialogueId, EntityId,
    EntityState, NativeScript, NativeScriptLoader, ObjectRegistry, ScriptApi, ScriptLoader,
    SimConfig, Vec3, END_CONVERSATION,
};
use tracing::info;

use super::bootstrap::SandboxError;

const GUARD_SCRIPT: &str = "guard_ai";
const GREET_RADIUS: f32 = 6.0;
const GUARD_ROUTE: [Vec3; 4] = [
    Vec3::new(-12.0, 0.0, -12.0),
    Vec3::new(12.0, 0.0, -12.0),
    Vec3::new(12.0, 0.0, 12.0),
    Vec3::new(-12.0, 0.0, 12.0),
];
const PLAYER_DESTINATION: Vec3 = Vec3::new(-12.0, 0.0, 10.0);
const VILLAGER_FIELD: [Vec3; 3] = [
    Vec3::new(20.0, 0.0, 20.0),
    Vec3::new(28.0, 0.0, 20.0),
    Vec3::new(24.0, 0.0, 28.0),
];

pub(crate) struct SandboxScene {
    pub(crate) manager: AgentManager<ObjectRegistry>,
    pub(crate) player: EntityId,
}

impl SandboxScene {
    /// Removes dead entities and their world objects. Returns how many went.
    pub(crate) fn reap_dead(&mut self) -> usize {
        let dead = self
            .manager
            .entity_ids()
            .into_iter()
            .filter(|id| self.manager.entity(*id).is_some_and(|entity| entity.is_dead()))
            .collect::<Vec<_>>();
        for id in &dead {
            if self.manager.handle_entity_death(*id) {
                info!(entity_id = id.0, "entity_reaped");
            }
        }
        dead.len()
    }
}

pub(crate) fn build_scene(
    config: &SimConfig,
    defs: &AgentDefDatabase,
    scripts_dir: &Path,
) -> Result<SandboxScene, SandboxError> {
    let mut manager = AgentManager::new(config.clone(), ObjectRegistry::new(), &rock_outcrop)?
        .with_script_loader(script_loader(scripts_dir));

    let player = spawn(&mut manager, defs, "player", Vec3::new(-20.0, 0.0, 0.0))?;
    manager.set_player(player);
    manager.move_towards(player, PLAYER_DESTINATION);

    spawn(&mut manager, defs, "guard", GUARD_ROUTE[0])?;
    let villager = spawn(&mut manager, defs, "villager", VILLAGER_FIELD[0])?;
    manager.set_waypoints(villager, VILLAGER_FIELD.to_vec());
    spawn(&mut manager, defs, "wolf", Vec3::new(40.0, 0.0, 40.0))?;

    info!(
        entities = manager.entity_count(),
        objects = manager.world().len(),
        "sandbox_scene_built"
    );
    Ok(SandboxScene { manager, player })
}

fn spawn(
    manager: &mut AgentManager<ObjectRegistry>,
    defs: &AgentDefDatabase,
    def_name: &str,
    position: Vec3,
) -> Result<EntityId, SandboxError> {
    let def = defs.get(def_name).ok_or_else(|| SandboxError::MissingDef {
        def_name: def_name.to_string(),
    })?;
    let object_id = manager.world_mut().add(def_name, position);
    Ok(manager.spawn_from_def(def, object_id))
}

/// A boulder field east of the guard route.
fn rock_outcrop(cell_center: Vec3, node_radius: f32) -> bool {
    let in_x = (cell_center.x - 4.0).abs() <= 2.0 + node_radius;
    let in_z = cell_center.z.abs() <= 6.0 + node_radius;
    in_x && in_z
}

fn native_scripts() -> NativeScriptLoader {
    let mut loader = NativeScriptLoader::new();
    loader.register(GUARD_SCRIPT, guard_script);
    loader
}

#[cfg(not(feature = "lua"))]
fn script_loader(scripts_dir: &Path) -> Box<dyn ScriptLoader> {
    info!(dir = %scripts_dir.display(), "lua_disabled_using_native_scripts");
    Box::new(native_scripts())
}

#[cfg(feature = "lua")]
fn script_loader(scripts_dir: &Path) -> Box<dyn ScriptLoader> {
    Box::new(LuaFirstLoader {
        lua: agent_engine::LuaScriptLoader::new(scripts_dir),
        native: native_scripts(),
    })
}

/// Prefers `<scripts_dir>/<name>.lua` and falls back to the built-in script
/// of the same name when no such file exists.
#[cfg(feature = "lua")]
struct LuaFirstLoader {
    lua: agent_engine::LuaScriptLoader,
    native: NativeScriptLoader,
}

#[cfg(feature = "lua")]
impl ScriptLoader for LuaFirstLoader {
    fn load(
        &mut self,
        name: &str,
    ) -> Result<Box<dyn agent_engine::ScriptRuntime>, agent_engine::ScriptError> {
        match self.lua.load(name) {
            Err(agent_engine::ScriptError::NotFound { .. }) if self.native.contains(name) => {
                info!(script = name, "lua_script_missing_using_native");
                self.native.load(name)
            }
            other => other,
        }
    }
}

fn add_greeting(api: &mut dyn ScriptApi) -> Result<DialogueId, DialogueError> {
    let dialogue = api.create_dialogue("guard_greeting");
    api.add_dialogue_node(dialogue, 0, "Halt! State your business.")?;
    api.add_dialogue_node(dialogue, 1, "Move along, then.")?;
    api.add_dialogue_option(dialogue, 0, "Just passing through.", 1)?;
    api.add_dialogue_option(dialogue, 0, "None of yours.", END_CONVERSATION)?;
    Ok(dialogue)
}

/// Walks the guard route, greeting the player once when they come close.
fn guard_script() -> NativeScript {
    let mut next_post = 1;
    let mut greeted = false;
    NativeScript::new()
        .on_init(|api: &mut dyn ScriptApi| {
            let dialogue = add_greeting(api).map_err(|error| error.to_string())?;
            api.associate_dialogue(dialogue);
            api.log("guard on duty");
            Ok(())
        })
        .on_main(move |api: &mut dyn ScriptApi| {
            if !greeted {
                let here = api.position();
                let player_close = api
                    .player_position()
                    .is_some_and(|player| player.distance(here) <= GREET_RADIUS);
                if player_close {
                    greeted = api.trigger_dialogue(0);
                }
            }
            if api.state() == EntityState::Idle {
                api.move_towards(GUARD_ROUTE[next_post]);
                next_post = (next_post + 1) % GUARD_ROUTE.len();
            }
            Ok(())
        })
        .on_end(|api: &mut dyn ScriptApi| {
            api.disassociate_dialogue();
            api.log("guard off duty");
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    use agent_engine::{
        load_agent_defs, BehaviorCategory, DialogueDisplay, EntitySpawn, OpenSpace, WorldObjects,
        WorldSize,
    };
    use tempfile::TempDir;

    use super::*;

    const DEFS: &str = r#"<Defs>
        <AgentDef><defName>player</defName><label>Player</label><behavior>Friendly</behavior>
            <health>100</health><damage>5</damage><speed>4</speed><detectionRadius>0</detectionRadius></AgentDef>
        <AgentDef><defName>guard</defName><label>Guard</label><behavior>Friendly</behavior>
            <health>120</health><damage>12</damage><speed>3</speed><detectionRadius>8</detectionRadius>
            <script>guard_ai</script></AgentDef>
        <AgentDef><defName>villager</defName><label>Villager</label><behavior>Passive</behavior>
            <health>40</health><damage>0</damage><speed>2.5</speed><detectionRadius>10</detectionRadius></AgentDef>
        <AgentDef><defName>wolf</defName><label>Wolf</label><behavior>Aggressive</behavior>
            <health>60</health><damage>8</damage><speed>4.5</speed><detectionRadius>15</detectionRadius></AgentDef>
    </Defs>"#;

    fn small_config() -> SimConfig {
        SimConfig {
            world_size: WorldSize {
                x: 100.0,
                y: 4.0,
                z: 100.0,
            },
            ..SimConfig::default()
        }
    }

    #[test]
    fn outcrop_blocks_only_its_footprint() {
        assert!(rock_outcrop(Vec3::new(4.0, 0.0, 0.0), 1.0));
        assert!(!rock_outcrop(Vec3::new(-12.0, 0.0, 0.0), 1.0));
        assert!(!rock_outcrop(Vec3::new(4.0, 0.0, 20.0), 1.0));
    }

    #[test]
    fn scene_spawns_every_archetype_and_runs() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join("base.xml"), DEFS).expect("write defs");
        let defs = load_agent_defs(temp.path()).expect("defs");

        let mut scene = build_scene(&small_config(), &defs, temp.path()).expect("scene");
        assert_eq!(scene.manager.entity_count(), 4);
        assert_eq!(scene.manager.player_id(), Some(scene.player));

        for _ in 0..120 {
            scene.manager.update(1.0 / 60.0);
            scene.reap_dead();
        }
        assert!(scene.manager.entity(scene.player).is_some());
    }

    #[test]
    fn missing_def_is_reported() {
        let temp = TempDir::new().expect("temp");
        fs::write(
            temp.path().join("base.xml"),
            DEFS.replace("<defName>wolf</defName>", "<defName>bear</defName>"),
        )
        .expect("write defs");
        let defs = load_agent_defs(temp.path()).expect("defs");

        let result = build_scene(&small_config(), &defs, temp.path());
        assert!(matches!(
            result,
            Err(SandboxError::MissingDef { ref def_name }) if def_name == "wolf"
        ));
    }

    struct SharedDisplay(Rc<RefCell<Vec<String>>>);

    impl DialogueDisplay for SharedDisplay {
        fn show(&mut self, text: &str, _options: &[&str]) {
            self.0.borrow_mut().push(text.to_string());
        }
    }

    #[test]
    fn guard_greets_the_player_not_the_closest_friendly() {
        let shown = Rc::new(RefCell::new(Vec::new()));
        let mut manager = AgentManager::new(small_config(), ObjectRegistry::new(), &OpenSpace)
            .expect("manager")
            .with_script_loader(Box::new(native_scripts()));
        manager.set_dialogue_display(Box::new(SharedDisplay(Rc::clone(&shown))));

        let guard_object = manager.world_mut().add("guard", Vec3::ZERO);
        manager.create_entity(
            EntitySpawn::new(
                "Guard",
                BehaviorCategory::Friendly,
                guard_object,
                120.0,
                12.0,
                3.0,
                8.0,
            )
            .with_script(GUARD_SCRIPT),
        );
        let farmer_object = manager.world_mut().add("farmer", Vec3::new(2.0, 0.0, 0.0));
        manager.create_entity(EntitySpawn::new(
            "Farmer",
            BehaviorCategory::Friendly,
            farmer_object,
            40.0,
            0.0,
            0.0,
            0.0,
        ));
        let player_object = manager.world_mut().add("player", Vec3::new(30.0, 0.0, 30.0));
        let player = manager.create_entity(EntitySpawn::new(
            "Player",
            BehaviorCategory::Friendly,
            player_object,
            100.0,
            5.0,
            0.0,
            0.0,
        ));
        assert!(manager.set_player(player));

        manager.update(1.0 / 60.0);
        assert!(shown.borrow().is_empty());

        let guard_position = manager.entity_position(EntityId(0)).expect("guard");
        manager
            .world_mut()
            .set_position(player_object, guard_position + Vec3::new(0.0, 0.0, 3.0));
        manager.update(1.0 / 60.0);
        assert_eq!(*shown.borrow(), vec!["Halt! State your business.".to_string()]);

        manager.update(1.0 / 60.0);
        assert_eq!(shown.borrow().len(), 1);
    }
}
