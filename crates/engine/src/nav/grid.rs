use thiserror::Error;

use crate::sim::math::Vec3;

/// Answers whether a cell is blocked. Queried once per cell when a grid is
/// built; the grid never re-probes afterwards.
pub trait OccupancyProbe {
    fn is_blocked(&self, cell_center: Vec3, node_radius: f32) -> bool;
}

impl<F> OccupancyProbe for F
where
    F: Fn(Vec3, f32) -> bool,
{
    fn is_blocked(&self, cell_center: Vec3, node_radius: f32) -> bool {
        self(cell_center, node_radius)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenSpace;

impl OccupancyProbe for OpenSpace {
    fn is_blocked(&self, _cell_center: Vec3, _node_radius: f32) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridCoord {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavGridError {
    #[error("node radius must be finite and > 0 (got {node_radius})")]
    InvalidNodeRadius { node_radius: f32 },
    #[error("world size must be finite and > 0 on every axis (got {x}, {y}, {z})")]
    InvalidWorldSize { x: f32, y: f32, z: f32 },
    #[error("world size {world_extent} on the {axis} axis holds no node of diameter {node_diameter}")]
    EmptyAxis {
        axis: &'static str,
        world_extent: f32,
        node_diameter: f32,
    },
    #[error("grid of {size_x}x{size_y}x{size_z} nodes is too large")]
    TooLarge { size_x: u32, size_y: u32, size_z: u32 },
}

/// Dense voxel grid centred on the world origin.
#[derive(Debug, Clone, PartialEq)]
pub struct NavGrid {
    world_size: Vec3,
    node_radius: f32,
    node_diameter: f32,
    size_x: u32,
    size_y: u32,
    size_z: u32,
    bottom_left: Vec3,
    walkable: Vec<bool>,
}

impl NavGrid {
    pub fn new(
        world_size: Vec3,
        node_radius: f32,
        probe: &dyn OccupancyProbe,
    ) -> Result<Self, NavGridError> {
        if !node_radius.is_finite() || node_radius <= 0.0 {
            return Err(NavGridError::InvalidNodeRadius { node_radius });
        }
        let size_is_valid = world_size.is_finite()
            && world_size.x > 0.0
            && world_size.y > 0.0
            && world_size.z > 0.0;
        if !size_is_valid {
            return Err(NavGridError::InvalidWorldSize {
                x: world_size.x,
                y: world_size.y,
                z: world_size.z,
            });
        }

        let node_diameter = node_radius * 2.0;
        let size_x = axis_node_count("x", world_size.x, node_diameter)?;
        let size_y = axis_node_count("y", world_size.y, node_diameter)?;
        let size_z = axis_node_count("z", world_size.z, node_diameter)?;
        let node_count = (size_x as usize)
            .checked_mul(size_y as usize)
            .and_then(|value| value.checked_mul(size_z as usize))
            .filter(|value| *value <= MAX_NODE_COUNT)
            .ok_or(NavGridError::TooLarge {
                size_x,
                size_y,
                size_z,
            })?;

        let mut grid = Self {
            world_size,
            node_radius,
            node_diameter,
            size_x,
            size_y,
            size_z,
            bottom_left: world_size * -0.5,
            walkable: Vec::with_capacity(node_count),
        };
        for index in 0..node_count {
            let center = grid.node_center(grid.coord_of(index));
            grid.walkable.push(!probe.is_blocked(center, node_radius));
        }
        Ok(grid)
    }

    pub fn size(&self) -> (u32, u32, u32) {
        (self.size_x, self.size_y, self.size_z)
    }

    pub fn node_count(&self) -> usize {
        self.walkable.len()
    }

    pub fn node_radius(&self) -> f32 {
        self.node_radius
    }

    pub fn world_size(&self) -> Vec3 {
        self.world_size
    }

    pub fn node_center(&self, coord: GridCoord) -> Vec3 {
        Vec3::new(
            self.bottom_left.x + self.node_diameter * coord.x as f32 + self.node_radius,
            self.bottom_left.y + self.node_diameter * coord.y as f32 + self.node_radius,
            self.bottom_left.z + self.node_diameter * coord.z as f32 + self.node_radius,
        )
    }

    /// Maps a world point to its cell. Points outside the world box snap to
    /// the nearest boundary cell.
    pub fn node_from_world_point(&self, point: Vec3) -> GridCoord {
        GridCoord {
            x: snap_axis(point.x, self.world_size.x, self.size_x),
            y: snap_axis(point.y, self.world_size.y, self.size_y),
            z: snap_axis(point.z, self.world_size.z, self.size_z),
        }
    }

    pub fn is_walkable(&self, coord: GridCoord) -> bool {
        self.index_of(coord)
            .and_then(|index| self.walkable.get(index))
            .copied()
            .unwrap_or(false)
    }

    pub fn index_of(&self, coord: GridCoord) -> Option<usize> {
        if coord.x >= self.size_x || coord.y >= self.size_y || coord.z >= self.size_z {
            return None;
        }
        let x = coord.x as usize;
        let y = coord.y as usize;
        let z = coord.z as usize;
        Some((z * self.size_y as usize + y) * self.size_x as usize + x)
    }

    pub fn coord_of(&self, index: usize) -> GridCoord {
        let size_x = self.size_x as usize;
        let size_y = self.size_y as usize;
        GridCoord {
            x: (index % size_x) as u32,
            y: ((index / size_x) % size_y) as u32,
            z: (index / (size_x * size_y)) as u32,
        }
    }

    /// The 26 surrounding cells that exist in the grid, visited x-major then
    /// y then z.
    pub fn neighbors(&self, coord: GridCoord) -> impl Iterator<Item = GridCoord> + '_ {
        NEIGHBOR_OFFSETS.iter().filter_map(move |&(dx, dy, dz)| {
            let x = offset_axis(coord.x, dx, self.size_x)?;
            let y = offset_axis(coord.y, dy, self.size_y)?;
            let z = offset_axis(coord.z, dz, self.size_z)?;
            Some(GridCoord { x, y, z })
        })
    }
}

const MAX_NODE_COUNT: usize = 64 * 1024 * 1024;

const NEIGHBOR_OFFSETS: [(i32, i32, i32); 26] = build_neighbor_offsets();

const fn build_neighbor_offsets() -> [(i32, i32, i32); 26] {
    let mut offsets = [(0, 0, 0); 26];
    let mut next = 0;
    let mut dx = -1;
    while dx <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dz = -1;
            while dz <= 1 {
                if !(dx == 0 && dy == 0 && dz == 0) {
                    offsets[next] = (dx, dy, dz);
                    next += 1;
                }
                dz += 1;
            }
            dy += 1;
        }
        dx += 1;
    }
    offsets
}

fn axis_node_count(
    axis: &'static str,
    world_extent: f32,
    node_diameter: f32,
) -> Result<u32, NavGridError> {
    let count = (world_extent / node_diameter).round();
    if count < 1.0 {
        return Err(NavGridError::EmptyAxis {
            axis,
            world_extent,
            node_diameter,
        });
    }
    // Saturates at u32::MAX, which the node budget in `new` then rejects.
    Ok(count as u32)
}

fn snap_axis(value: f32, world_extent: f32, node_count: u32) -> u32 {
    let percent = if value.is_finite() {
        ((value + world_extent * 0.5) / world_extent).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let last = node_count.saturating_sub(1);
    ((last as f32 * percent).round() as u32).min(last)
}

fn offset_axis(value: u32, delta: i32, size: u32) -> Option<u32> {
    let moved = value.checked_add_signed(delta)?;
    (moved < size).then_some(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(x: f32, y: f32, z: f32) -> NavGrid {
        NavGrid::new(Vec3::new(x, y, z), 0.5, &OpenSpace).expect("grid")
    }

    #[test]
    fn grid_size_rounds_world_over_diameter() {
        let grid = open_grid(5.0, 1.0, 4.0);
        assert_eq!(grid.size(), (5, 1, 4));
        assert_eq!(grid.node_count(), 20);
    }

    #[test]
    fn node_centers_are_offset_by_radius_from_bottom_left() {
        let grid = open_grid(4.0, 2.0, 4.0);
        assert_eq!(
            grid.node_center(GridCoord::new(0, 0, 0)),
            Vec3::new(-1.5, -0.5, -1.5)
        );
        assert_eq!(
            grid.node_center(GridCoord::new(3, 1, 3)),
            Vec3::new(1.5, 0.5, 1.5)
        );
    }

    #[test]
    fn world_points_outside_bounds_snap_to_boundary_cells() {
        let grid = open_grid(4.0, 2.0, 4.0);
        assert_eq!(
            grid.node_from_world_point(Vec3::new(-100.0, -100.0, -100.0)),
            GridCoord::new(0, 0, 0)
        );
        assert_eq!(
            grid.node_from_world_point(Vec3::new(100.0, 100.0, 100.0)),
            GridCoord::new(3, 1, 3)
        );
        let center = grid.node_center(GridCoord::new(2, 1, 1));
        assert_eq!(grid.node_from_world_point(center), GridCoord::new(2, 1, 1));
    }

    #[test]
    fn interior_cell_has_twenty_six_neighbors_and_corner_has_seven() {
        let grid = open_grid(3.0, 3.0, 3.0);
        assert_eq!(grid.neighbors(GridCoord::new(1, 1, 1)).count(), 26);
        assert_eq!(grid.neighbors(GridCoord::new(0, 0, 0)).count(), 7);
        assert!(grid
            .neighbors(GridCoord::new(1, 1, 1))
            .all(|coord| coord != GridCoord::new(1, 1, 1)));
    }

    #[test]
    fn probe_marks_cells_blocked_once() {
        let grid = NavGrid::new(
            Vec3::new(3.0, 1.0, 3.0),
            0.5,
            &|center: Vec3, _radius: f32| center.x > 0.0 && center.z > 0.0,
        )
        .expect("grid");
        assert!(!grid.is_walkable(GridCoord::new(2, 0, 2)));
        assert!(grid.is_walkable(GridCoord::new(1, 0, 1)));
        assert!(!grid.is_walkable(GridCoord::new(9, 0, 0)));
    }

    #[test]
    fn index_and_coord_are_inverse() {
        let grid = open_grid(3.0, 2.0, 4.0);
        for index in 0..grid.node_count() {
            assert_eq!(grid.index_of(grid.coord_of(index)), Some(index));
        }
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        assert!(matches!(
            NavGrid::new(Vec3::new(1.0, 1.0, 1.0), 0.0, &OpenSpace),
            Err(NavGridError::InvalidNodeRadius { .. })
        ));
        assert!(matches!(
            NavGrid::new(Vec3::new(1.0, -1.0, 1.0), 0.5, &OpenSpace),
            Err(NavGridError::InvalidWorldSize { .. })
        ));
        assert!(matches!(
            NavGrid::new(Vec3::new(1.0, 0.2, 1.0), 0.5, &OpenSpace),
            Err(NavGridError::EmptyAxis { axis: "y", .. })
        ));
    }

    #[test]
    fn oversized_worlds_are_too_large() {
        assert!(matches!(
            NavGrid::new(Vec3::new(1.0e12, 2.0, 2.0), 1.0, &OpenSpace),
            Err(NavGridError::TooLarge {
                size_x: u32::MAX,
                size_y: 1,
                size_z: 1,
            })
        ));
        assert!(matches!(
            NavGrid::new(Vec3::new(1.0e4, 1.0e4, 1.0e4), 0.5, &OpenSpace),
            Err(NavGridError::TooLarge { size_x: 10_000, .. })
        ));
    }
}
