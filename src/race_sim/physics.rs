//! Physics - Rapier world wiring
//!
//! Owns the rigid-body solver state and translates track solids and marbles
//! into configured bodies/colliders. The solver itself (broad phase, narrow
//! phase, constraint solving) is rapier's; this module only configures and
//! consumes it.

use std::sync::Mutex;

use rapier3d::na::{Translation3, UnitQuaternion};
use rapier3d::prelude::*;

use crate::race_sim::obstacles::PIN_RESTITUTION;
use crate::race_sim::track::{SolidKind, SolidShape, Track};

/// Standard gravity, straight down.
const GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];
/// Hard cap on a single solver step; hosts with a stalled frame get several
/// capped steps instead of one unstable jumbo step.
pub const MAX_STEP_DT: f32 = 1.0 / 30.0;

pub const MARBLE_RADIUS: f32 = 0.5;
const MARBLE_MASS: f32 = 1.0;
const MARBLE_FRICTION: f32 = 0.05;
const MARBLE_RESTITUTION: f32 = 0.5;
/// Damping bounds terminal speed on long slopes.
const MARBLE_LINEAR_DAMPING: f32 = 0.15;
/// Keeps spin from running away after obstacle hits.
const MARBLE_ANGULAR_DAMPING: f32 = 0.4;

const FLOOR_FRICTION: f32 = 0.1;

const GROUP_TRACK: Group = Group::GROUP_1;
const GROUP_MARBLE: Group = Group::GROUP_2;
const GROUP_SENSOR: Group = Group::GROUP_3;

fn track_groups() -> InteractionGroups {
    InteractionGroups::new(GROUP_TRACK, GROUP_MARBLE, InteractionTestMode::And)
}

fn sensor_groups() -> InteractionGroups {
    InteractionGroups::new(GROUP_SENSOR, GROUP_MARBLE, InteractionTestMode::And)
}

fn marble_groups() -> InteractionGroups {
    InteractionGroups::new(
        GROUP_MARBLE,
        GROUP_TRACK | GROUP_MARBLE | GROUP_SENSOR,
        InteractionTestMode::And,
    )
}

/// Groups for a marble that already finished: still collides with the track
/// and other marbles, but no longer intersects the finish sensor.
fn finished_marble_groups() -> InteractionGroups {
    InteractionGroups::new(GROUP_MARBLE, GROUP_TRACK | GROUP_MARBLE, InteractionTestMode::And)
}

/// Synchronous collision-event queue drained once per tick.
#[derive(Default)]
struct CollisionEventQueue {
    events: Mutex<Vec<CollisionEvent>>,
}

impl CollisionEventQueue {
    fn drain(&self) -> Vec<CollisionEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }
}

impl EventHandler for CollisionEventQueue {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Ordering key so event processing is independent of rapier's reporting
/// order.
fn event_key(event: &CollisionEvent) -> ((u32, u32), (u32, u32)) {
    match event {
        CollisionEvent::Started(a, b, _) | CollisionEvent::Stopped(a, b, _) => {
            (a.into_raw_parts(), b.into_raw_parts())
        }
    }
}

/// The rapier world for one race session.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    events: CollisionEventQueue,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![GRAVITY[0], GRAVITY[1], GRAVITY[2]],
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            events: CollisionEventQueue::default(),
        }
    }

    /// Tear down and rebuild the static collision geometry from a track.
    ///
    /// Inserts one fixed body plus collider per solid; returns the handle of
    /// the finish sensor if the track carries one.
    pub fn build_static(&mut self, track: &Track) -> Option<ColliderHandle> {
        self.reset();

        let mut sensor = None;
        for solid in track.solids() {
            let iso = Isometry::from_parts(Translation3::from(solid.translation), solid.rotation);
            let body = RigidBodyBuilder::fixed().pose(iso).build();
            let body_handle = self.bodies.insert(body);

            let builder = match solid.shape {
                SolidShape::Cuboid { half_extents } => {
                    ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
                }
                SolidShape::CylinderY {
                    radius,
                    half_height,
                } => ColliderBuilder::cylinder(half_height, radius),
            };

            let collider = match solid.kind {
                SolidKind::Floor => builder
                    .friction(FLOOR_FRICTION)
                    .collision_groups(track_groups())
                    .build(),
                // Frictionless walls: grazing contact must not slow racers.
                SolidKind::Wall => builder
                    .friction(0.0)
                    .collision_groups(track_groups())
                    .build(),
                SolidKind::BumperPin => builder
                    .restitution(PIN_RESTITUTION)
                    .restitution_combine_rule(CoefficientCombineRule::Max)
                    .collision_groups(track_groups())
                    .build(),
                SolidKind::FinishSensor => builder
                    .sensor(true)
                    .active_events(ActiveEvents::COLLISION_EVENTS)
                    .collision_groups(sensor_groups())
                    .build(),
            };

            let handle = self
                .colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);
            if solid.kind == SolidKind::FinishSensor {
                sensor = Some(handle);
            }
        }
        sensor
    }

    /// Spawn one marble at the given point.
    ///
    /// Sleeping is disabled for the whole race so low-velocity heuristics
    /// cannot freeze a body that is still in play; CCD keeps fast marbles
    /// from tunnelling through the floor slabs.
    pub fn spawn_marble(&mut self, at: Point<Real>) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::dynamic()
            .pose(Isometry::from_parts(
                Translation3::from(at.coords),
                UnitQuaternion::identity(),
            ))
            .linear_damping(MARBLE_LINEAR_DAMPING)
            .angular_damping(MARBLE_ANGULAR_DAMPING)
            .can_sleep(false)
            .ccd_enabled(true)
            .build();
        let body_handle = self.bodies.insert(body);
        // The sensor carries the event flag; marbles stay quiet so the tick
        // queue only ever holds finish crossings.
        let collider = ColliderBuilder::ball(MARBLE_RADIUS)
            .mass(MARBLE_MASS)
            .friction(MARBLE_FRICTION)
            .restitution(MARBLE_RESTITUTION)
            .collision_groups(marble_groups())
            .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    /// Advance the world by one capped, blocking solver step and return the
    /// tick's collision events in deterministic order.
    pub fn step(&mut self, dt: f32) -> Vec<CollisionEvent> {
        self.params.dt = dt.clamp(0.0, MAX_STEP_DT);
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &self.events,
        );

        let mut events = self.events.drain();
        events.sort_by_key(event_key);
        events
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Stop a finished marble from re-triggering the finish sensor.
    pub fn retire_from_sensor(&mut self, collider: ColliderHandle) {
        if let Some(collider) = self.colliders.get_mut(collider) {
            collider.set_collision_groups(finished_marble_groups());
        }
    }

    /// Deregister a body and everything attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn reset(&mut self) {
        self.islands = IslandManager::new();
        self.broad_phase = BroadPhaseBvh::new();
        self.narrow_phase = NarrowPhase::new();
        self.bodies = RigidBodySet::new();
        self.colliders = ColliderSet::new();
        self.impulse_joints = ImpulseJointSet::new();
        self.multibody_joints = MultibodyJointSet::new();
        self.ccd_solver = CCDSolver::new();
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race_sim::track::{TrackConfig, TrackGenerator};

    #[test]
    fn spawned_marble_falls_under_gravity() {
        let mut world = PhysicsWorld::new();
        let (body, _) = world.spawn_marble(point![0.0, 10.0, 0.0]);
        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        let y = world.body(body).unwrap().translation().y;
        assert!(y < 9.0, "marble did not fall: y = {y}");
    }

    #[test]
    fn building_statics_yields_the_finish_sensor() {
        let track = TrackGenerator::with_seed(21)
            .generate(&TrackConfig::default())
            .unwrap();
        let mut world = PhysicsWorld::new();
        assert!(world.build_static(&track).is_some());
    }

    #[test]
    fn step_caps_runaway_timesteps() {
        let mut world = PhysicsWorld::new();
        let (body, _) = world.spawn_marble(point![0.0, 0.0, 0.0]);
        // One stalled two-second frame must not integrate two seconds.
        world.step(2.0);
        let y = world.body(body).unwrap().translation().y;
        let max_drop = 0.5 * 9.81 * MAX_STEP_DT * MAX_STEP_DT + 0.1;
        assert!(y.abs() <= max_drop, "uncapped step moved marble to {y}");
    }
}
