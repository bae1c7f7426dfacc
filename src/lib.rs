//! Marble Race - Simulation Core
//!
//! In-process marble-racing library: a seeded procedural track generator,
//! a rapier-backed race runtime with exactly-once finish detection, and
//! leader-tracking camera math. A host application drives [`Simulation`]
//! once per frame and renders the returned transforms; rendering, UI and
//! follower-data upload live entirely in the host.

pub mod race_sim;

pub use race_sim::camera::{CameraMode, CameraRig, LeaderTracker};
pub use race_sim::participant::{
    color_for_username, mock_roster, Participant, ParticipantId, Rgb, MAX_ROSTER,
};
pub use race_sim::race::{
    FinishEvent, MarbleSnapshot, MarbleStatus, Race, RaceError, RaceResult, RaceSnapshot,
    RaceStatus,
};
pub use race_sim::simulation::{GamePhase, SimStats, Simulation};
pub use race_sim::track::{
    Segment, SolidKind, SolidShape, Track, TrackConfig, TrackError, TrackGenerator, TrackSolid,
};
