use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::sim::behavior::ArbiterRules;
use crate::sim::math::Vec3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json{}: {message}", at_path(.path))]
    Parse { path: String, message: String },
}

fn at_path(path: &str) -> String {
    if path.is_empty() || path == "." {
        String::new()
    } else {
        format!(" at {path}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldSize {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<WorldSize> for Vec3 {
    fn from(value: WorldSize) -> Self {
        Vec3::new(value.x, value.y, value.z)
    }
}

/// Tunables for a simulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub world_size: WorldSize,
    pub node_radius: f32,
    pub melee_range: f32,
    pub flee_step: f32,
    pub waypoint_tolerance: f32,
    pub path_arrival_radius: f32,
    pub default_wander_radius: f32,
    pub default_max_force: f32,
    pub rng_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_size: WorldSize {
                x: 160.0,
                y: 8.0,
                z: 160.0,
            },
            node_radius: 1.0,
            melee_range: 2.0,
            flee_step: 10.0,
            waypoint_tolerance: 0.1,
            path_arrival_radius: 1.0,
            default_wander_radius: 10.0,
            default_max_force: 10.0,
            rng_seed: 0x5eed_a9e7,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, SimConfig>(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            ConfigError::Parse {
                path,
                message: error.into_inner().to_string(),
            }
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Replaces values the simulation cannot run with by their defaults.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        let world_ok = [self.world_size.x, self.world_size.y, self.world_size.z]
            .iter()
            .all(|value| value.is_finite() && *value > 0.0);
        if !world_ok {
            warn!(
                x = self.world_size.x,
                y = self.world_size.y,
                z = self.world_size.z,
                "config_world_size_invalid_using_default"
            );
            self.world_size = defaults.world_size;
        }
        self.node_radius = positive_or_default("node_radius", self.node_radius, defaults.node_radius);
        self.melee_range = non_negative_or_default("melee_range", self.melee_range, defaults.melee_range);
        self.flee_step = non_negative_or_default("flee_step", self.flee_step, defaults.flee_step);
        self.waypoint_tolerance = non_negative_or_default(
            "waypoint_tolerance",
            self.waypoint_tolerance,
            defaults.waypoint_tolerance,
        );
        self.path_arrival_radius = positive_or_default(
            "path_arrival_radius",
            self.path_arrival_radius,
            defaults.path_arrival_radius,
        );
        self.default_wander_radius = non_negative_or_default(
            "default_wander_radius",
            self.default_wander_radius,
            defaults.default_wander_radius,
        );
        self.default_max_force = non_negative_or_default(
            "default_max_force",
            self.default_max_force,
            defaults.default_max_force,
        );
        self
    }

    pub fn world_extent(&self) -> Vec3 {
        self.world_size.into()
    }

    pub fn arbiter_rules(&self) -> ArbiterRules {
        ArbiterRules {
            melee_range: self.melee_range,
            flee_step: self.flee_step,
            waypoint_tolerance: self.waypoint_tolerance,
        }
    }
}

fn positive_or_default(field: &'static str, value: f32, default: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        return value;
    }
    warn!(field, value, default, "config_value_invalid_using_default");
    default
}

fn non_negative_or_default(field: &'static str, value: f32, default: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        return value;
    }
    warn!(field, value, default, "config_value_invalid_using_default");
    default
}
