mod astar;
mod grid;

pub use astar::{movement_cost, Pathfinder};
pub use grid::{GridCoord, NavGrid, NavGridError, OccupancyProbe, OpenSpace};
