//! Obstacles - Bumper pin placement
//!
//! Scatters static bumper pins over segments flagged for obstacles, using
//! the same rotate-then-translate rule as the side walls so pins stand
//! upright on the floor of banked and sloped segments.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;

use crate::race_sim::track::{Segment, FLOOR_THICKNESS, TRACK_WIDTH};

pub const PIN_RADIUS: f32 = 0.8;
pub const PIN_HALF_HEIGHT: f32 = 1.5;
/// Elevated bounce so pins kick marbles sideways instead of stopping them.
pub const PIN_RESTITUTION: f32 = 0.8;

/// One pin per this many units of segment length.
const PIN_SPACING: f32 = 14.0;
/// Keep the whole pin clear of the walls.
const LATERAL_MARGIN: f32 = PIN_RADIUS + 0.4;
/// Keep pins away from segment joints.
const END_MARGIN: f32 = 4.0;

/// A static bumper cylinder, axis perpendicular to its segment's floor.
#[derive(Debug, Clone, Copy)]
pub struct Pin {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

/// Scatter pins over every obstacle-flagged segment.
///
/// Count is proportional to segment length; lateral and forward offsets are
/// drawn in the segment's local frame and rotated into world space.
pub fn scatter_pins(segments: &[Segment], rng: &mut impl Rng) -> Vec<Pin> {
    let mut pins = Vec::new();
    let lateral_limit = TRACK_WIDTH / 2.0 - LATERAL_MARGIN;

    for seg in segments.iter().filter(|s| s.has_obstacles) {
        let count = ((seg.length / PIN_SPACING).floor() as usize).max(1);
        let forward_limit = seg.length / 2.0 - END_MARGIN;
        for _ in 0..count {
            let local = Vector3::new(
                rng.gen_range(-lateral_limit..lateral_limit),
                FLOOR_THICKNESS / 2.0 + PIN_HALF_HEIGHT,
                rng.gen_range(-forward_limit..forward_limit),
            );
            pins.push(Pin {
                position: seg.local_to_world(local),
                rotation: seg.rotation(),
            });
        }
    }
    pins
}
