//! Race - Live race session
//!
//! Owns the physics world for one race, the participant-to-body mapping,
//! the race clock, finish detection and the ranked standings. Created at
//! race start, dropped at race end; nothing here outlives the session.

use std::collections::HashMap;

use nalgebra::{Point3, UnitQuaternion};
use rapier3d::prelude::{CollisionEvent, ColliderHandle, RigidBodyHandle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::race_sim::participant::{Participant, ParticipantId};
use crate::race_sim::physics::{PhysicsWorld, MAX_STEP_DT};
use crate::race_sim::track::Track;

/// How far below the lowest track point a body may fall before it is
/// declared out of bounds and removed.
const OUT_OF_BOUNDS_MARGIN: f32 = 25.0;

#[derive(Debug, Error)]
pub enum RaceError {
    #[error("cannot start a race with an empty roster")]
    EmptyRoster,
    #[error("track exposes no finish sensor")]
    MissingFinishSensor,
}

/// Where a marble stands in the race lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarbleStatus {
    Racing,
    Finished,
    /// Escaped the track envelope (solver instability or a geometry seam);
    /// removed from leader and finish consideration, race continues.
    OutOfBounds,
}

/// Live per-marble state. Transforms refresh every tick while the body is
/// registered; the last known transform is kept after removal.
#[derive(Debug, Clone)]
pub struct MarbleState {
    pub id: ParticipantId,
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub status: MarbleStatus,
    body: Option<RigidBodyHandle>,
    collider: ColliderHandle,
}

impl MarbleState {
    /// Progress along the track's primary forward axis.
    pub fn progress(&self) -> f32 {
        self.position.z
    }
}

/// Emitted at most once per participant per race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishEvent {
    pub participant_id: ParticipantId,
    pub elapsed_ms: u32,
}

/// One leaderboard row; `rank` is the 1-based position after sorting by time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub participant_id: ParticipantId,
    pub username: String,
    pub elapsed_ms: u32,
    pub rank: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    Racing,
    /// Every marble has finished or dropped out.
    Complete,
}

/// Compact per-marble state for the render boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarbleSnapshot {
    pub id: ParticipantId,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub status: MarbleStatus,
}

/// Read-only view of the whole race for the host, refreshed per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub status: RaceStatus,
    pub elapsed_ms: u32,
    pub marbles: Vec<MarbleSnapshot>,
    pub finisher_count: u32,
}

/// A running race: physics world, marbles, clock and standings.
pub struct Race {
    world: PhysicsWorld,
    sensor: ColliderHandle,
    marbles: Vec<MarbleState>,
    by_collider: HashMap<ColliderHandle, usize>,
    usernames: Vec<String>,
    results: Vec<RaceResult>,
    clock: f64,
    kill_y: f32,
}

impl Race {
    /// Build the static world from the track and spawn one marble per
    /// participant on the start grid.
    pub fn new(track: &Track, participants: &[Participant]) -> Result<Self, RaceError> {
        if participants.is_empty() {
            return Err(RaceError::EmptyRoster);
        }

        let mut world = PhysicsWorld::new();
        let sensor = world
            .build_static(track)
            .ok_or(RaceError::MissingFinishSensor)?;

        let spawns = track.spawn_points(participants.len());
        let mut marbles = Vec::with_capacity(participants.len());
        let mut by_collider = HashMap::with_capacity(participants.len());
        let mut usernames = Vec::with_capacity(participants.len());

        for (participant, spawn) in participants.iter().zip(spawns) {
            let (body, collider) = world.spawn_marble(spawn);
            by_collider.insert(collider, marbles.len());
            usernames.push(participant.username.clone());
            marbles.push(MarbleState {
                id: participant.id,
                position: spawn,
                rotation: UnitQuaternion::identity(),
                status: MarbleStatus::Racing,
                body: Some(body),
                collider,
            });
        }

        Ok(Self {
            world,
            sensor,
            marbles,
            by_collider,
            usernames,
            results: Vec::new(),
            clock: 0.0,
            kill_y: track.lowest_point_y() - OUT_OF_BOUNDS_MARGIN,
        })
    }

    /// Advance the race by one tick.
    ///
    /// Steps the solver, drains sensor crossings in deterministic order,
    /// records at most one finish per participant and refreshes marble
    /// transforms. Returns the finish events this tick produced.
    pub fn tick(&mut self, dt: f32) -> Vec<FinishEvent> {
        let dt = dt.clamp(0.0, MAX_STEP_DT);
        self.clock += f64::from(dt);

        let events = self.world.step(dt);
        let mut finishes = Vec::new();
        for event in events {
            let CollisionEvent::Started(a, b, _) = event else {
                continue;
            };
            let other = if a == self.sensor {
                b
            } else if b == self.sensor {
                a
            } else {
                continue;
            };
            if let Some(&index) = self.by_collider.get(&other) {
                if let Some(finish) = self.record_finish(index) {
                    finishes.push(finish);
                }
            }
        }

        self.refresh_transforms();
        finishes
    }

    /// Record a finish for the marble at `index`, once.
    ///
    /// The marble's collider stops intersecting the sensor afterwards, so a
    /// body lingering in or re-entering the volume cannot fire again; the
    /// status check backstops events already queued this tick.
    fn record_finish(&mut self, index: usize) -> Option<FinishEvent> {
        let marble = &mut self.marbles[index];
        if marble.status != MarbleStatus::Racing {
            return None;
        }
        marble.status = MarbleStatus::Finished;
        self.world.retire_from_sensor(marble.collider);

        let elapsed_ms = (self.clock * 1000.0).round() as u32;
        let id = marble.id;
        log::info!(
            "{} finished after {:.2}s",
            self.usernames[index],
            self.clock
        );
        self.results.push(RaceResult {
            participant_id: id,
            username: self.usernames[index].clone(),
            elapsed_ms,
            rank: 0,
        });
        resort_standings(&mut self.results);

        Some(FinishEvent {
            participant_id: id,
            elapsed_ms,
        })
    }

    /// Pull body transforms out of the solver and cull escaped bodies.
    fn refresh_transforms(&mut self) {
        for marble in &mut self.marbles {
            let Some(handle) = marble.body else { continue };
            let Some(body) = self.world.body(handle) else {
                // A vanished body must not poison the rest of the tick.
                log::warn!("marble {:?} lost its rigid body", marble.id);
                marble.body = None;
                if marble.status == MarbleStatus::Racing {
                    marble.status = MarbleStatus::OutOfBounds;
                }
                continue;
            };

            let translation = *body.translation();
            let escaped = !translation.iter().all(|c| c.is_finite())
                || translation.y < self.kill_y;
            if !escaped {
                marble.position = Point3::from(translation);
                marble.rotation = *body.rotation();
                continue;
            }

            self.world.remove_body(handle);
            marble.body = None;
            if marble.status == MarbleStatus::Racing {
                marble.status = MarbleStatus::OutOfBounds;
                log::warn!("marble {:?} left the track envelope", marble.id);
            }
        }
    }

    /// Marble with the greatest forward progress that is still in play.
    pub fn leader(&self) -> Option<&MarbleState> {
        self.marbles
            .iter()
            .filter(|m| m.status == MarbleStatus::Racing)
            .max_by(|a, b| a.progress().total_cmp(&b.progress()))
    }

    pub fn marbles(&self) -> &[MarbleState] {
        &self.marbles
    }

    /// Standings so far, ascending by elapsed time.
    pub fn standings(&self) -> &[RaceResult] {
        &self.results
    }

    pub fn elapsed_ms(&self) -> u32 {
        (self.clock * 1000.0).round() as u32
    }

    pub fn status(&self) -> RaceStatus {
        if self
            .marbles
            .iter()
            .any(|m| m.status == MarbleStatus::Racing)
        {
            RaceStatus::Racing
        } else {
            RaceStatus::Complete
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status() == RaceStatus::Complete
    }

    /// Compact state for the render boundary.
    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            status: self.status(),
            elapsed_ms: self.elapsed_ms(),
            marbles: self
                .marbles
                .iter()
                .map(|m| MarbleSnapshot {
                    id: m.id,
                    position: m.position.coords.into(),
                    rotation: m.rotation.coords.into(),
                    status: m.status,
                })
                .collect(),
            finisher_count: self.results.len() as u32,
        }
    }
}

/// Re-sort standings ascending by time and reassign 1-based ranks.
///
/// The sort is stable, so exact-time ties keep their processing order.
fn resort_standings(results: &mut [RaceResult]) {
    results.sort_by_key(|r| r.elapsed_ms);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i as u32 + 1;
    }
}
