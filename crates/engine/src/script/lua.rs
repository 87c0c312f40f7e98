use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use mlua::{Function, Lua, Table, Value};
use tracing::debug;

use crate::dialogue::{DialogueId, NodeId};
use crate::sim::entity::{BehaviorCategory, EntityId, EntityInfo};
use crate::sim::math::Vec3;

use super::{ScriptApi, ScriptError, ScriptHook, ScriptLoader, ScriptRuntime};

const API_GLOBAL: &str = "ai";

/// Loads `<scripts_dir>/<name>.lua`, one Lua state per script instance.
#[derive(Debug, Clone)]
pub struct LuaScriptLoader {
    scripts_dir: PathBuf,
}

impl LuaScriptLoader {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }
}

impl ScriptLoader for LuaScriptLoader {
    fn load(&mut self, name: &str) -> Result<Box<dyn ScriptRuntime>, ScriptError> {
        let path = self.scripts_dir.join(format!("{name}.lua"));
        if !path.is_file() {
            return Err(ScriptError::NotFound {
                name: name.to_string(),
            });
        }
        let source = fs::read_to_string(&path).map_err(|error| ScriptError::Load {
            name: name.to_string(),
            message: error.to_string(),
        })?;

        let lua = Lua::new();
        lua.load(source.as_str())
            .set_name(name)
            .exec()
            .map_err(|error| ScriptError::Load {
                name: name.to_string(),
                message: error.to_string(),
            })?;
        debug!(script = name, path = %path.display(), "lua_script_loaded");
        Ok(Box::new(LuaScript { lua }))
    }
}

struct LuaScript {
    lua: Lua,
}

fn entry_point(hook: ScriptHook) -> &'static str {
    match hook {
        ScriptHook::Init => "init",
        ScriptHook::Main => "main",
        // `end` is a Lua keyword.
        ScriptHook::End => "end_",
    }
}

impl ScriptRuntime for LuaScript {
    fn call(&mut self, hook: ScriptHook, api: &mut dyn ScriptApi) -> Result<(), ScriptError> {
        let hook_error = |error: mlua::Error| ScriptError::Hook {
            hook,
            message: error.to_string(),
        };
        let function = self
            .lua
            .globals()
            .get::<Option<Function>>(entry_point(hook))
            .map_err(hook_error)?;
        let Some(function) = function else {
            return Ok(());
        };

        let api = RefCell::new(api);
        let lua = &self.lua;
        let result = lua.scope(|scope| {
            let table = lua.create_table()?;

            table.set(
                "entity_id",
                scope.create_function(|_, ()| with_api(&api, |api| api.entity_id().0))?,
            )?;
            table.set(
                "position",
                scope.create_function(|_, ()| with_api(&api, |api| unpack(api.position())))?,
            )?;
            table.set(
                "velocity",
                scope.create_function(|_, ()| with_api(&api, |api| unpack(api.velocity())))?,
            )?;
            table.set(
                "health",
                scope.create_function(|_, ()| with_api(&api, |api| api.health()))?,
            )?;
            table.set(
                "max_health",
                scope.create_function(|_, ()| with_api(&api, |api| api.max_health()))?,
            )?;
            table.set(
                "damage",
                scope.create_function(|_, ()| with_api(&api, |api| api.damage()))?,
            )?;
            table.set(
                "speed",
                scope.create_function(|_, ()| with_api(&api, |api| api.speed()))?,
            )?;
            table.set(
                "state",
                scope.create_function(|_, ()| with_api(&api, |api| api.state().as_str()))?,
            )?;
            table.set(
                "behavior",
                scope.create_function(|_, ()| with_api(&api, |api| api.behavior().as_str()))?,
            )?;
            table.set(
                "object_id",
                scope.create_function(|_, ()| with_api(&api, |api| api.object_id().0))?,
            )?;

            table.set(
                "set_waypoints",
                scope.create_function(|_, points: Vec<Table>| {
                    let waypoints = points
                        .iter()
                        .map(read_point)
                        .collect::<mlua::Result<Vec<_>>>()?;
                    with_api(&api, |api| api.set_waypoints(waypoints))
                })?,
            )?;
            table.set(
                "add_waypoint",
                scope.create_function(|_, (x, y, z): (f32, f32, f32)| {
                    with_api(&api, |api| api.add_waypoint(Vec3::new(x, y, z)))
                })?,
            )?;
            table.set(
                "clear_waypoints",
                scope.create_function(|_, ()| with_api(&api, |api| api.clear_waypoints()))?,
            )?;
            table.set(
                "move_towards",
                scope.create_function(|_, (x, y, z): (f32, f32, f32)| {
                    with_api(&api, |api| api.move_towards(Vec3::new(x, y, z)))
                })?,
            )?;
            table.set(
                "set_max_speed",
                scope.create_function(|_, value: f32| {
                    with_api(&api, |api| api.set_max_speed(value))
                })?,
            )?;
            table.set(
                "set_max_force",
                scope.create_function(|_, value: f32| {
                    with_api(&api, |api| api.set_max_force(value))
                })?,
            )?;
            table.set(
                "attack",
                scope.create_function(|_, target: u64| {
                    with_api(&api, |api| api.attack(EntityId(target)))
                })?,
            )?;
            table.set(
                "heal",
                scope.create_function(|_, amount: f32| with_api(&api, |api| api.heal(amount)))?,
            )?;
            table.set(
                "set_state",
                scope.create_function(|_, name: String| {
                    with_api(&api, |api| api.set_state(&name))
                })?,
            )?;

            table.set(
                "find_nearest",
                scope.create_function(|_, category: String| {
                    let category = category
                        .parse::<BehaviorCategory>()
                        .map_err(mlua::Error::external)?;
                    with_api(&api, |api| api.find_nearest(category).map(|id| id.0))
                })?,
            )?;
            table.set(
                "distance_to",
                scope.create_function(|_, other: u64| {
                    with_api(&api, |api| api.distance_to(EntityId(other)))
                })?,
            )?;
            table.set(
                "nearby_entities",
                scope.create_function(|_, radius: f32| {
                    with_api(&api, |api| {
                        api.nearby_entities(radius)
                            .into_iter()
                            .map(|id| id.0)
                            .collect::<Vec<_>>()
                    })
                })?,
            )?;
            table.set(
                "nearby_objects",
                scope.create_function(|lua, radius: f32| {
                    let objects = with_api(&api, |api| api.nearby_objects(radius))?;
                    let list = lua.create_table()?;
                    for (index, object) in objects.into_iter().enumerate() {
                        let entry = point_table(lua, object.position)?;
                        entry.set("id", object.id.0)?;
                        entry.set("kind", object.kind)?;
                        list.set(index + 1, entry)?;
                    }
                    Ok(list)
                })?,
            )?;
            table.set(
                "entity_info",
                scope.create_function(|lua, id: u64| {
                    match with_api(&api, |api| api.entity_info(EntityId(id)))? {
                        Some(info) => info_table(lua, &info).map(Value::Table),
                        None => Ok(Value::Nil),
                    }
                })?,
            )?;
            table.set(
                "player_position",
                scope.create_function(|lua, ()| {
                    match with_api(&api, |api| api.player_position())? {
                        Some(position) => point_table(lua, position).map(Value::Table),
                        None => Ok(Value::Nil),
                    }
                })?,
            )?;
            table.set(
                "time_of_day",
                scope.create_function(|_, ()| with_api(&api, |api| api.time_of_day()))?,
            )?;
            table.set(
                "terrain_height",
                scope.create_function(|_, (x, z): (f32, f32)| {
                    with_api(&api, |api| api.terrain_height(x, z))
                })?,
            )?;
            table.set(
                "line_of_sight",
                scope.create_function(|_, (x, y, z): (f32, f32, f32)| {
                    with_api(&api, |api| api.line_of_sight(Vec3::new(x, y, z)))
                })?,
            )?;

            table.set(
                "create_dialogue",
                scope.create_function(|_, name: String| {
                    with_api(&api, |api| api.create_dialogue(&name).0)
                })?,
            )?;
            table.set(
                "clone_dialogue",
                scope.create_function(|_, source: u32| {
                    with_api(&api, |api| api.clone_dialogue(DialogueId(source)))?
                        .map(|id| id.0)
                        .map_err(mlua::Error::external)
                })?,
            )?;
            table.set(
                "remove_dialogue",
                scope.create_function(|_, id: u32| {
                    with_api(&api, |api| api.remove_dialogue(DialogueId(id)))?
                        .map_err(mlua::Error::external)
                })?,
            )?;
            table.set(
                "add_dialogue_node",
                scope.create_function(|_, (id, node, text): (u32, NodeId, String)| {
                    with_api(&api, |api| api.add_dialogue_node(DialogueId(id), node, &text))?
                        .map_err(mlua::Error::external)
                })?,
            )?;
            table.set(
                "update_dialogue_node",
                scope.create_function(|_, (id, node, text): (u32, NodeId, String)| {
                    with_api(&api, |api| {
                        api.update_dialogue_node(DialogueId(id), node, &text)
                    })?
                    .map_err(mlua::Error::external)
                })?,
            )?;
            table.set(
                "remove_dialogue_node",
                scope.create_function(|_, (id, node): (u32, NodeId)| {
                    with_api(&api, |api| api.remove_dialogue_node(DialogueId(id), node))?
                        .map_err(mlua::Error::external)
                })?,
            )?;
            table.set(
                "add_dialogue_option",
                scope.create_function(
                    |_, (id, node, text, next): (u32, NodeId, String, NodeId)| {
                        with_api(&api, |api| {
                            api.add_dialogue_option(DialogueId(id), node, &text, next)
                        })?
                        .map_err(mlua::Error::external)
                    },
                )?,
            )?;
            table.set(
                "update_dialogue_option",
                scope.create_function(
                    |_, (id, node, index, text): (u32, NodeId, usize, String)| {
                        with_api(&api, |api| {
                            api.update_dialogue_option(DialogueId(id), node, index, &text)
                        })?
                        .map_err(mlua::Error::external)
                    },
                )?,
            )?;
            table.set(
                "remove_dialogue_option",
                scope.create_function(|_, (id, node, index): (u32, NodeId, usize)| {
                    with_api(&api, |api| {
                        api.remove_dialogue_option(DialogueId(id), node, index)
                    })?
                    .map_err(mlua::Error::external)
                })?,
            )?;
            table.set(
                "associate_dialogue",
                scope.create_function(|_, id: u32| {
                    with_api(&api, |api| api.associate_dialogue(DialogueId(id)))
                })?,
            )?;
            table.set(
                "disassociate_dialogue",
                scope.create_function(|_, ()| with_api(&api, |api| api.disassociate_dialogue()))?,
            )?;
            table.set(
                "dialogue_id",
                scope.create_function(|_, ()| {
                    with_api(&api, |api| api.dialogue_id().map(|id| id.0))
                })?,
            )?;
            table.set(
                "trigger_dialogue",
                scope.create_function(|_, start: NodeId| {
                    with_api(&api, |api| api.trigger_dialogue(start))
                })?,
            )?;
            table.set(
                "log",
                scope.create_function(|_, message: String| {
                    with_api(&api, |api| api.log(&message))
                })?,
            )?;

            lua.globals().set(API_GLOBAL, table.clone())?;
            let outcome = function.call::<()>(table);
            lua.globals().set(API_GLOBAL, Value::Nil)?;
            outcome
        });
        result.map_err(hook_error)
    }
}

/// Lends the bound entity's API to one call. Re-entering the API from inside
/// a call is a script error.
fn with_api<R>(
    api: &RefCell<&mut dyn ScriptApi>,
    call: impl FnOnce(&mut dyn ScriptApi) -> R,
) -> mlua::Result<R> {
    let mut api = api
        .try_borrow_mut()
        .map_err(|_| mlua::Error::RuntimeError("script api is already in use".to_string()))?;
    Ok(call(&mut **api))
}

fn unpack(point: Vec3) -> (f32, f32, f32) {
    (point.x, point.y, point.z)
}

fn read_point(table: &Table) -> mlua::Result<Vec3> {
    Ok(Vec3::new(
        table.get::<f32>("x")?,
        table.get::<f32>("y")?,
        table.get::<f32>("z")?,
    ))
}

fn point_table(lua: &Lua, point: Vec3) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("x", point.x)?;
    table.set("y", point.y)?;
    table.set("z", point.z)?;
    Ok(table)
}

fn info_table(lua: &Lua, info: &EntityInfo) -> mlua::Result<Table> {
    let table = point_table(lua, info.position)?;
    table.set("id", info.id.0)?;
    table.set("name", info.name.as_str())?;
    table.set("behavior", info.behavior.as_str())?;
    table.set("state", info.state.as_str())?;
    table.set("health", info.health)?;
    table.set("max_health", info.max_health)?;
    table.set("damage", info.damage)?;
    table.set("speed", info.speed)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::config::{SimConfig, WorldSize};
    use crate::nav::OpenSpace;
    use crate::script::BehaviorSource;
    use crate::sim::entity::EntitySpawn;
    use crate::sim::manager::AgentManager;
    use crate::sim::world::ObjectRegistry;

    fn write_script(dir: &Path, name: &str, source: &str) {
        fs::write(dir.join(format!("{name}.lua")), source).expect("write script");
    }

    fn manager(dir: &Path) -> AgentManager<ObjectRegistry> {
        let config = SimConfig {
            world_size: WorldSize {
                x: 40.0,
                y: 4.0,
                z: 40.0,
            },
            ..SimConfig::default()
        };
        AgentManager::new(config, ObjectRegistry::new(), &OpenSpace)
            .expect("manager")
            .with_script_loader(Box::new(LuaScriptLoader::new(dir)))
    }

    fn spawn(
        manager: &mut AgentManager<ObjectRegistry>,
        behavior: BehaviorCategory,
        position: Vec3,
        script: &str,
    ) -> EntityId {
        let object_id = manager.world_mut().add("agent", position);
        manager.create_entity(
            EntitySpawn::new("agent", behavior, object_id, 50.0, 5.0, 0.0, 0.0)
                .with_script(script),
        )
    }

    #[test]
    fn hooks_drive_the_entity_through_the_ai_table() {
        let temp = TempDir::new().expect("temp");
        write_script(
            temp.path(),
            "hunter",
            r#"
            function init(ai)
                local d = ai.create_dialogue("hail")
                ai.add_dialogue_node(d, 0, "Who goes there?")
                ai.associate_dialogue(d)
            end

            function main(ai)
                local prey = ai.find_nearest("Passive")
                if prey then
                    ai.attack(prey)
                end
            end
            "#,
        );
        let mut manager = manager(temp.path());
        let hunter = spawn(&mut manager, BehaviorCategory::Aggressive, Vec3::ZERO, "hunter");
        let deer = spawn(&mut manager, BehaviorCategory::Passive, Vec3::new(9.0, 0.0, 9.0), "");

        assert!(manager
            .behavior_source(hunter)
            .is_some_and(BehaviorSource::is_scripted));
        assert!(manager.dialogue_id_of(hunter).is_some());

        let report = manager.update(0.1);
        assert_eq!(report.script_faults, 0);
        assert_eq!(manager.entity(deer).expect("deer").health(), 45.0);
    }

    #[test]
    fn player_position_and_max_health_are_exposed() {
        let temp = TempDir::new().expect("temp");
        write_script(
            temp.path(),
            "follower",
            r#"
            function main(ai)
                if ai.max_health() ~= 50 then
                    error("unexpected max health")
                end
                local player = ai.player_position()
                if player then
                    ai.move_towards(player.x, player.y, player.z)
                end
            end
            "#,
        );
        let mut manager = manager(temp.path());
        let follower = spawn(&mut manager, BehaviorCategory::Friendly, Vec3::ZERO, "follower");

        let report = manager.update(0.1);
        assert_eq!(report.script_faults, 0);
        assert!(manager.entity(follower).expect("follower").path().is_empty());

        let player = spawn(
            &mut manager,
            BehaviorCategory::Friendly,
            Vec3::new(10.0, 0.0, 0.0),
            "",
        );
        assert!(manager.set_player(player));
        let report = manager.update(0.1);
        assert_eq!(report.script_faults, 0);
        let path = manager.entity(follower).expect("follower").path();
        assert_eq!(path.back().copied(), Some(Vec3::new(9.0, 1.0, 1.0)));
    }

    #[test]
    fn runtime_errors_are_reported_as_hook_faults() {
        let temp = TempDir::new().expect("temp");
        write_script(temp.path(), "faulty", "function main(ai) error('boom') end");
        let mut manager = manager(temp.path());
        spawn(&mut manager, BehaviorCategory::Passive, Vec3::ZERO, "faulty");

        let report = manager.update(0.1);
        assert_eq!(report.script_faults, 1);
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn missing_or_broken_scripts_fail_to_load() {
        let temp = TempDir::new().expect("temp");
        write_script(temp.path(), "broken", "function main(ai");
        let mut loader = LuaScriptLoader::new(temp.path());

        assert!(matches!(
            loader.load("absent"),
            Err(ScriptError::NotFound { .. })
        ));
        assert!(matches!(loader.load("broken"), Err(ScriptError::Load { .. })));
    }

    #[test]
    fn undefined_hooks_are_skipped() {
        let temp = TempDir::new().expect("temp");
        write_script(temp.path(), "empty", "local unused = 1");
        let mut manager = manager(temp.path());
        let id = spawn(&mut manager, BehaviorCategory::Passive, Vec3::ZERO, "empty");

        assert_eq!(manager.update(0.1).script_faults, 0);
        manager.destroy_entity(id);
        assert_eq!(manager.entity_count(), 0);
    }
}
