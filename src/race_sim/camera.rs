//! Camera - Leader tracking and camera modes
//!
//! A one-pole low-pass filter over the race leader's position feeds the
//! follow camera; the cinematic mode is a purely time-driven orbit around
//! the start vista. Free mode belongs to the host's interactive controls.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Smoothing factor for the leader target; deliberately small for a slow
/// cinematic glide rather than a snap.
pub const LEADER_SMOOTHING: f32 = 0.05;
/// Start vista held while no marble is live.
const DEFAULT_TARGET: [f32; 3] = [0.0, 20.0, 0.0];

const FOLLOW_LATERAL_SCALE: f32 = 0.8;
const FOLLOW_HEIGHT: f32 = 10.0;
const FOLLOW_DISTANCE: f32 = 15.0;
const FOLLOW_LOOK_AHEAD: f32 = 5.0;
const FOLLOW_STIFFNESS: f32 = 3.0;

const ORBIT_RATE: f32 = 0.2;
const ORBIT_RADIUS_X: f32 = 30.0;
const ORBIT_RADIUS_Z: f32 = 10.0;
const ORBIT_CENTER_Z: f32 = 40.0;
const ORBIT_HEIGHT: f32 = 20.0;
const ORBIT_LOOK_AT: [f32; 3] = [0.0, 0.0, 50.0];

/// Duration of one full cinematic orbit.
pub fn orbit_period() -> f32 {
    std::f32::consts::TAU / ORBIT_RATE
}

/// Camera position on the cinematic orbit at a given elapsed time.
///
/// Pure function of time; exactly periodic with [`orbit_period`].
pub fn cinematic_position(elapsed: f32) -> Point3<f32> {
    let phase = elapsed * ORBIT_RATE;
    Point3::new(
        phase.sin() * ORBIT_RADIUS_X,
        ORBIT_HEIGHT,
        ORBIT_CENTER_Z + phase.cos() * ORBIT_RADIUS_Z,
    )
}

fn lerp(from: Point3<f32>, to: Point3<f32>, t: f32) -> Point3<f32> {
    from + (to - from) * t
}

/// Smoothed target point trailing whichever live marble leads the race.
#[derive(Debug, Clone)]
pub struct LeaderTracker {
    target: Point3<f32>,
}

impl LeaderTracker {
    pub fn new() -> Self {
        Self {
            target: Point3::from(DEFAULT_TARGET),
        }
    }

    /// Ease the target toward the current leader, or hold the start vista
    /// when nobody is in play.
    pub fn update(&mut self, leader: Option<Point3<f32>>) {
        match leader {
            Some(position) => self.target = lerp(self.target, position, LEADER_SMOOTHING),
            None => self.target = Point3::from(DEFAULT_TARGET),
        }
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }
}

impl Default for LeaderTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMode {
    /// Trail behind and above the smoothed leader target
    Follow,
    /// Time-driven orbit near the track start
    Cinematic,
    /// Host-controlled; the rig reports its pose untouched
    Free,
}

/// Current camera pose plus the active mode.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub mode: CameraMode,
    position: Point3<f32>,
    look_at: Point3<f32>,
}

impl CameraRig {
    pub fn new(mode: CameraMode) -> Self {
        Self {
            mode,
            position: cinematic_position(0.0),
            look_at: Point3::from(ORBIT_LOOK_AT),
        }
    }

    /// Advance the rig one tick.
    ///
    /// `elapsed` drives the cinematic orbit; `target` is the smoothed leader
    /// point from [`LeaderTracker`].
    pub fn update(&mut self, dt: f32, elapsed: f32, target: Point3<f32>) {
        match self.mode {
            CameraMode::Follow => {
                let desired = Point3::new(
                    target.x * FOLLOW_LATERAL_SCALE,
                    target.y + FOLLOW_HEIGHT,
                    target.z - FOLLOW_DISTANCE,
                );
                self.position = lerp(self.position, desired, (FOLLOW_STIFFNESS * dt).min(1.0));
                self.look_at = target + Vector3::new(0.0, 0.0, FOLLOW_LOOK_AHEAD);
            }
            CameraMode::Cinematic => {
                self.position = cinematic_position(elapsed);
                self.look_at = Point3::from(ORBIT_LOOK_AT);
            }
            CameraMode::Free => {}
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn look_at(&self) -> Point3<f32> {
        self.look_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cinematic_orbit_is_periodic() {
        for t in [0.0f32, 3.7, 11.2] {
            let a = cinematic_position(t);
            let b = cinematic_position(t + orbit_period());
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-3);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-3);
            assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-3);
        }
    }

    #[test]
    fn tracker_eases_toward_the_leader() {
        let mut tracker = LeaderTracker::new();
        let leader = Point3::new(0.0, 0.0, 100.0);
        let before = (tracker.target() - leader).norm();
        tracker.update(Some(leader));
        let after = (tracker.target() - leader).norm();
        assert!(after < before);
        // One-pole filter: one update never snaps all the way.
        assert!(after > 0.0);
    }

    #[test]
    fn tracker_holds_the_start_vista_without_a_leader() {
        let mut tracker = LeaderTracker::new();
        tracker.update(Some(Point3::new(5.0, 5.0, 50.0)));
        tracker.update(None);
        assert_eq!(tracker.target(), Point3::from(DEFAULT_TARGET));
    }

    #[test]
    fn follow_camera_converges_behind_the_target() {
        let mut rig = CameraRig::new(CameraMode::Follow);
        let target = Point3::new(2.0, -10.0, 200.0);
        for _ in 0..600 {
            rig.update(1.0 / 60.0, 0.0, target);
        }
        let position = rig.position();
        assert_abs_diff_eq!(position.x, target.x * FOLLOW_LATERAL_SCALE, epsilon = 1e-2);
        assert_abs_diff_eq!(position.y, target.y + FOLLOW_HEIGHT, epsilon = 1e-2);
        assert_abs_diff_eq!(position.z, target.z - FOLLOW_DISTANCE, epsilon = 1e-2);
        assert_abs_diff_eq!(rig.look_at().z, target.z + FOLLOW_LOOK_AHEAD, epsilon = 1e-4);
    }

    #[test]
    fn free_mode_never_overrides_the_pose() {
        let mut rig = CameraRig::new(CameraMode::Free);
        let before = rig.position();
        rig.update(1.0 / 60.0, 42.0, Point3::new(9.0, 9.0, 9.0));
        assert_eq!(rig.position(), before);
    }
}
