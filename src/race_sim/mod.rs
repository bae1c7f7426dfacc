//! Race Simulation Module
//!
//! Procedural track generation, the rigid-body race runtime and the
//! leader/camera tracking that sit between a host frame loop and rapier.

pub mod camera;
pub mod obstacles;
pub mod participant;
pub mod physics;
pub mod race;
pub mod simulation;
pub mod track;

pub use camera::{CameraMode, CameraRig, LeaderTracker};
pub use participant::{Participant, ParticipantId, Rgb};
pub use race::{FinishEvent, Race, RaceResult, RaceSnapshot, RaceStatus};
pub use simulation::{GamePhase, Simulation};
pub use track::{Track, TrackConfig, TrackGenerator};
