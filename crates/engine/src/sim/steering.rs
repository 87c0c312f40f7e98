use std::collections::VecDeque;

use super::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSteering {
    Seek(Vec3),
    /// Decelerating into the last point of a consumed path.
    Arrive(Vec3),
    /// The path was empty before this call.
    Exhausted,
}

impl PathSteering {
    pub fn force(self) -> Vec3 {
        match self {
            Self::Seek(force) | Self::Arrive(force) => force,
            Self::Exhausted => Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
}

pub fn seek(target: Vec3, position: Vec3, velocity: Vec3, max_speed: f32, max_force: f32) -> Vec3 {
    let desired = (target - position).normalized() * max_speed;
    bound_force(desired - velocity, max_force)
}

pub fn arrive(
    target: Vec3,
    position: Vec3,
    velocity: Vec3,
    max_speed: f32,
    max_force: f32,
    slowing_radius: f32,
) -> Vec3 {
    let to_target = target - position;
    let distance = to_target.length();
    if distance <= f32::EPSILON {
        return Vec3::ZERO;
    }
    // A zero slowing radius ramps to infinity and clips to full speed.
    let ramped_speed = max_speed * (distance / slowing_radius);
    let clipped_speed = ramped_speed.min(max_speed);
    let desired = to_target * (clipped_speed / distance);
    bound_force(desired - velocity, max_force)
}

/// Consumes every leading waypoint inside `arrival_radius`, then seeks the
/// next one. Once the last waypoint is consumed the result arrives at it.
pub fn follow_path(
    path: &mut VecDeque<Vec3>,
    position: Vec3,
    velocity: Vec3,
    max_speed: f32,
    max_force: f32,
    arrival_radius: f32,
) -> PathSteering {
    let arrival_radius_sq = arrival_radius * arrival_radius;
    let mut reached = None;
    while let Some(front) = path.front().copied() {
        if front.distance_squared(position) >= arrival_radius_sq {
            break;
        }
        reached = path.pop_front();
    }

    match (path.front().copied(), reached) {
        (Some(next), _) => PathSteering::Seek(seek(next, position, velocity, max_speed, max_force)),
        (None, Some(last)) => PathSteering::Arrive(arrive(
            last,
            position,
            velocity,
            max_speed,
            max_force,
            arrival_radius,
        )),
        (None, None) => PathSteering::Exhausted,
    }
}

/// Semi-implicit Euler step with the velocity clamped to `max_speed`.
pub fn integrate(state: Kinematics, force: Vec3, max_speed: f32, dt_seconds: f32) -> Kinematics {
    let velocity = (state.velocity + force * dt_seconds).clamp_length(max_speed);
    Kinematics {
        position: state.position + velocity * dt_seconds,
        velocity,
    }
}

fn bound_force(force: Vec3, max_force: f32) -> Vec3 {
    let max_force = max_force.max(0.0);
    force.clamp_components(-max_force, max_force)
}
