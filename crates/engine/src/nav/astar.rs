use crate::sim::math::Vec3;

use super::grid::{GridCoord, NavGrid};

const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

#[derive(Debug, Clone)]
pub struct Pathfinder {
    grid: NavGrid,
}

impl Pathfinder {
    pub fn new(grid: NavGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &NavGrid {
        &self.grid
    }

    /// Grid-snapped node centres from the start cell to the target cell, or
    /// `None` when both points share a cell or no route exists.
    ///
    /// Closed nodes are never reopened, so a cheaper route found later into a
    /// closed node is ignored.
    pub fn find_path(&self, start: Vec3, target: Vec3) -> Option<Vec<Vec3>> {
        let start_coord = self.grid.node_from_world_point(start);
        let target_coord = self.grid.node_from_world_point(target);
        if start_coord == target_coord || !self.grid.is_walkable(target_coord) {
            return None;
        }
        let coords = self.find_path_coords(start_coord, target_coord)?;
        Some(
            coords
                .into_iter()
                .map(|coord| self.grid.node_center(coord))
                .collect(),
        )
    }

    fn find_path_coords(&self, start: GridCoord, goal: GridCoord) -> Option<Vec<GridCoord>> {
        let start_index = self.grid.index_of(start)?;
        let goal_index = self.grid.index_of(goal)?;

        let node_count = self.grid.node_count();
        let mut closed = vec![false; node_count];
        let mut in_open = vec![false; node_count];
        let mut g_cost = vec![0u32; node_count];
        let mut h_cost = vec![0u32; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = vec![start_index];
        in_open[start_index] = true;
        h_cost[start_index] = movement_cost(start, goal);

        while !open.is_empty() {
            let best_slot = pick_best_open_slot(&open, &g_cost, &h_cost);
            let current_index = open.remove(best_slot);
            in_open[current_index] = false;
            closed[current_index] = true;

            if current_index == goal_index {
                return reconstruct_path(&self.grid, &parent, start_index, goal_index);
            }

            let current = self.grid.coord_of(current_index);
            let current_g = g_cost[current_index];
            for neighbor in self.grid.neighbors(current) {
                let Some(neighbor_index) = self.grid.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !self.grid.is_walkable(neighbor) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(movement_cost(current, neighbor));
                if tentative_g >= g_cost[neighbor_index] && in_open[neighbor_index] {
                    continue;
                }

                g_cost[neighbor_index] = tentative_g;
                h_cost[neighbor_index] = movement_cost(neighbor, goal);
                parent[neighbor_index] = Some(current_index);
                if !in_open[neighbor_index] {
                    in_open[neighbor_index] = true;
                    open.push(neighbor_index);
                }
            }
        }

        None
    }
}

/// Octile-style cost between two cells: 14 per step along the two minor
/// axes, 10 per remaining step along the major one. Used both as the edge
/// cost and the heuristic.
pub fn movement_cost(a: GridCoord, b: GridCoord) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    let dz = a.z.abs_diff(b.z);
    if dx > dy && dx > dz {
        DIAGONAL_COST * dy + DIAGONAL_COST * dz + STRAIGHT_COST * (dx - dy.max(dz))
    } else if dy > dz {
        DIAGONAL_COST * dx + DIAGONAL_COST * dz + STRAIGHT_COST * (dy - dx.max(dz))
    } else {
        DIAGONAL_COST * dx + DIAGONAL_COST * dy + STRAIGHT_COST * (dz - dx.max(dy))
    }
}

fn pick_best_open_slot(open: &[usize], g_cost: &[u32], h_cost: &[u32]) -> usize {
    let order_key = |index: usize| (g_cost[index].saturating_add(h_cost[index]), h_cost[index]);
    let mut best_slot = 0usize;
    for slot in 1..open.len() {
        if order_key(open[slot]) < order_key(open[best_slot]) {
            best_slot = slot;
        }
    }
    best_slot
}

fn reconstruct_path(
    grid: &NavGrid,
    parent: &[Option<usize>],
    start_index: usize,
    goal_index: usize,
) -> Option<Vec<GridCoord>> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        let next = parent.get(cursor).and_then(|value| *value)?;
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    Some(indices.into_iter().map(|index| grid.coord_of(index)).collect())
}
