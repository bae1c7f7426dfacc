//! Simulation - Host-facing state machine
//!
//! Owns the track, roster, optional live race, leader tracker and camera
//! rig, and provides the tick/snapshot interface a host application drives
//! once per frame. All mutation happens synchronously inside `tick`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::race_sim::camera::{CameraMode, CameraRig, LeaderTracker};
use crate::race_sim::participant::{Participant, MAX_ROSTER};
use crate::race_sim::physics::MAX_STEP_DT;
use crate::race_sim::race::{FinishEvent, Race, RaceError, RaceResult, RaceSnapshot};
use crate::race_sim::track::{Track, TrackConfig, TrackError, TrackGenerator};

/// Outer application phase (menu and editor chrome live in the host; this
/// only gates what `tick` does).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Menu,
    Editing,
    Racing,
    Finished,
}

/// Tick-loop health statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimStats {
    pub avg_tick_time_ms: f32,
    pub marble_count: u32,
    pub phase: GamePhase,
}

/// The whole simulation as seen by the host.
pub struct Simulation {
    phase: GamePhase,
    config: TrackConfig,
    generator: TrackGenerator,
    track: Track,
    roster: Vec<Participant>,
    race: Option<Race>,
    tracker: LeaderTracker,
    camera: CameraRig,
    /// Total simulated time; drives the cinematic orbit.
    time: f64,
    tick_times: Vec<f32>,
}

impl Simulation {
    /// Fresh simulation with unpredictable track jitter.
    pub fn new() -> Result<Self, TrackError> {
        Self::from_generator(TrackGenerator::from_entropy())
    }

    /// Fresh simulation with reproducible track jitter.
    pub fn with_seed(seed: u64) -> Result<Self, TrackError> {
        Self::from_generator(TrackGenerator::with_seed(seed))
    }

    fn from_generator(mut generator: TrackGenerator) -> Result<Self, TrackError> {
        let config = TrackConfig::default();
        let track = generator.generate(&config)?;
        Ok(Self {
            phase: GamePhase::Menu,
            config,
            generator,
            track,
            roster: Vec::new(),
            race: None,
            tracker: LeaderTracker::new(),
            camera: CameraRig::new(CameraMode::Cinematic),
            time: 0.0,
            tick_times: Vec::with_capacity(60),
        })
    }

    /// Replace the roster. Truncated to [`MAX_ROSTER`]; tears down any
    /// active race first, since participants are read-only while racing.
    pub fn set_roster(&mut self, mut roster: Vec<Participant>) {
        if self.race.is_some() {
            self.end_race();
        }
        if roster.len() > MAX_ROSTER {
            log::warn!("roster truncated from {} to {}", roster.len(), MAX_ROSTER);
            roster.truncate(MAX_ROSTER);
        }
        self.roster = roster;
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Apply a new track config: clamp, regenerate the track and rebuild
    /// everything static. An active race is torn down first so regeneration
    /// never races a solver step.
    pub fn set_track_config(&mut self, config: TrackConfig) -> Result<(), TrackError> {
        if self.race.is_some() {
            self.end_race();
        }
        let config = config.clamped();
        self.track = self.generator.generate(&config)?;
        self.config = config;
        log::info!(
            "track regenerated: {} segments, {} pins",
            self.track.segments().len(),
            self.track.pins().len()
        );
        Ok(())
    }

    /// Re-roll the current config for fresh slope/obstacle jitter.
    pub fn regenerate_track(&mut self) -> Result<(), TrackError> {
        self.set_track_config(self.config)
    }

    pub fn config(&self) -> TrackConfig {
        self.config
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Switch to the track editor vista.
    pub fn enter_editor(&mut self) {
        if self.race.is_some() {
            self.end_race();
        }
        self.phase = GamePhase::Editing;
        self.camera.mode = CameraMode::Cinematic;
    }

    /// Spawn one marble per participant and start the clock.
    pub fn start_race(&mut self) -> Result<(), RaceError> {
        let race = Race::new(&self.track, &self.roster)?;
        log::info!("race started with {} marbles", self.roster.len());
        self.race = Some(race);
        self.phase = GamePhase::Racing;
        self.tracker = LeaderTracker::new();
        self.camera.mode = CameraMode::Follow;
        Ok(())
    }

    /// Advance the simulation by one frame.
    ///
    /// Returns the finish events produced this tick; the current state is
    /// available via [`Simulation::snapshot`]. A no-op in the menu.
    pub fn tick(&mut self, dt: f32) -> Vec<FinishEvent> {
        if self.phase == GamePhase::Menu {
            return Vec::new();
        }
        let started = Instant::now();
        let dt = dt.clamp(0.0, MAX_STEP_DT);
        self.time += f64::from(dt);

        let mut finishes = Vec::new();
        if let Some(race) = &mut self.race {
            finishes = race.tick(dt);
            self.tracker.update(race.leader().map(|m| m.position));
            if self.phase == GamePhase::Racing && race.is_complete() {
                self.phase = GamePhase::Finished;
                log::info!("race complete: {} finishers", race.standings().len());
            }
        }
        self.camera
            .update(dt, self.time as f32, self.tracker.target());

        self.record_tick_time(started.elapsed().as_secs_f32() * 1000.0);
        finishes
    }

    /// Read-only view of the live race, if any.
    pub fn snapshot(&self) -> Option<RaceSnapshot> {
        self.race.as_ref().map(Race::snapshot)
    }

    /// Standings of the live or just-finished race.
    pub fn results(&self) -> Option<&[RaceResult]> {
        self.race.as_ref().map(Race::standings)
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn set_camera_mode(&mut self, mode: CameraMode) {
        self.camera.mode = mode;
    }

    /// Tear down the race and return to the menu. Dropping the session
    /// deregisters every body; nothing fires after this.
    pub fn end_race(&mut self) {
        if self.race.take().is_some() {
            log::info!("race torn down");
        }
        self.phase = GamePhase::Menu;
        self.tracker = LeaderTracker::new();
        self.camera.mode = CameraMode::Cinematic;
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn stats(&self) -> SimStats {
        let avg = if self.tick_times.is_empty() {
            0.0
        } else {
            self.tick_times.iter().sum::<f32>() / self.tick_times.len() as f32
        };
        SimStats {
            avg_tick_time_ms: avg,
            marble_count: self
                .race
                .as_ref()
                .map(|r| r.marbles().len() as u32)
                .unwrap_or(0),
            phase: self.phase,
        }
    }

    fn record_tick_time(&mut self, ms: f32) {
        self.tick_times.push(ms);
        if self.tick_times.len() > 60 {
            self.tick_times.remove(0);
        }
    }
}
