//! Track - Procedural track generation
//!
//! Turns a small `TrackConfig` into an ordered chain of sloped, banked
//! segments plus the static collision solids (floor slab, side walls,
//! bumper pins, finish sensor) the physics world is built from.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::race_sim::obstacles::{self, Pin, PIN_HALF_HEIGHT, PIN_RADIUS};

/// Width of the rollable floor surface.
pub const TRACK_WIDTH: f32 = 12.0;
/// High walls so fast marbles cannot fly out on banked sections.
pub const WALL_HEIGHT: f32 = 6.0;
pub const WALL_THICKNESS: f32 = 1.0;
pub const FLOOR_THICKNESS: f32 = 1.0;

/// Where the start ramp begins; everything descends from here.
const START_FRONTIER: [f32; 3] = [0.0, 24.0, 0.0];
const START_RAMP_LENGTH: f32 = 40.0;
const START_RAMP_PITCH: f32 = 0.1;

const FINISH_LENGTH: f32 = 30.0;
const FINISH_PITCH: f32 = 0.02;
/// Sensor depth along the travel axis.
const FINISH_SENSOR_DEPTH: f32 = 1.0;
const FINISH_SENSOR_HALF_HEIGHT: f32 = 5.0;

/// Body segment length band; re-rolled on every generation pass.
const BODY_LENGTH_MIN: f32 = 40.0;
const BODY_LENGTH_MAX: f32 = 60.0;

/// Slope tuning. Pitch stays inside [MIN_PITCH, MAX_PITCH] so marbles keep
/// moving against friction without exceeding a safe top speed.
const BASE_PITCH: f32 = 0.06;
const STEEPNESS_PITCH: f32 = 0.15;
const PITCH_JITTER: f32 = 0.02;
const MIN_PITCH: f32 = 0.04;
const MAX_PITCH: f32 = 0.35;

/// Bank tuning. Banking is clamped non-negative so the tilt direction never
/// flips mid-track.
const BANK_SCALE: f32 = 0.5;
const BANK_JITTER: f32 = 0.03;
const MAX_BANK: f32 = 0.3;

const SEGMENT_COUNT_RANGE: (u32, u32) = (3, 50);
const STEEPNESS_RANGE: (f32, f32) = (0.2, 1.8);
const CHAOS_RANGE: (f32, f32) = (0.0, 1.0);
const BANKING_RANGE: (f32, f32) = (0.0, 0.5);

/// Spawn grid over the start ramp (4 columns, fixed spacing, above floor).
const SPAWN_COLUMNS: u32 = 4;
const SPAWN_SPACING: f32 = 1.5;
const SPAWN_CLEARANCE: f32 = 2.0;
const SPAWN_RAMP_LEAD: f32 = 4.0;

/// Track shape parameters, immutable per race.
///
/// Out-of-range values are clamped, never rejected, so the generator stays
/// total over anything a host UI sends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Number of body segments between start ramp and finish (3-50)
    pub segment_count: u32,
    /// Slope multiplier (0.2-1.8)
    pub steepness: f32,
    /// Probability of obstacles per body segment (0-1)
    pub chaos_level: f32,
    /// Lateral tilt amount, signed consistently (0-0.5)
    pub banking: f32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            segment_count: 10,
            steepness: 1.0,
            chaos_level: 0.5,
            banking: 0.2,
        }
    }
}

impl TrackConfig {
    /// Clamp every field into its documented range.
    pub fn clamped(self) -> Self {
        Self {
            segment_count: self
                .segment_count
                .clamp(SEGMENT_COUNT_RANGE.0, SEGMENT_COUNT_RANGE.1),
            steepness: self.steepness.clamp(STEEPNESS_RANGE.0, STEEPNESS_RANGE.1),
            chaos_level: self.chaos_level.clamp(CHAOS_RANGE.0, CHAOS_RANGE.1),
            banking: self.banking.clamp(BANKING_RANGE.0, BANKING_RANGE.1),
        }
    }
}

/// Generation failures; fatal to the attempt, caller retries with a
/// sanitized config instead of rendering a broken track.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("segment {index} has degenerate length {length}")]
    DegenerateSegment { index: usize, length: f32 },
    #[error("segment {index} produced a non-finite transform")]
    NonFiniteTransform { index: usize },
}

/// One contiguous straight stretch of track.
///
/// `position` is the center of the floor slab. Orientation is pitch about
/// the lateral axis plus bank about the travel axis; yaw is always zero.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub position: Point3<f32>,
    pub pitch: f32,
    pub bank: f32,
    pub length: f32,
    pub has_obstacles: bool,
    pub is_finish: bool,
}

impl Segment {
    /// Full orientation of the segment.
    pub fn rotation(&self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_euler_angles(self.pitch, 0.0, self.bank)
    }

    /// Rotate a segment-local offset into world space and translate it.
    ///
    /// Every attached solid (walls, pins, sensor) goes through this; applying
    /// local offsets in world axes misplaces them on banked or sloped
    /// segments and opens escape gaps.
    pub fn local_to_world(&self, local: Vector3<f32>) -> Point3<f32> {
        self.position + self.rotation() * local
    }

    /// Point where the segment begins (shared with the previous frontier).
    pub fn start_point(&self) -> Point3<f32> {
        self.local_to_world(Vector3::new(0.0, 0.0, -self.length / 2.0))
    }

    /// Point where the segment ends and the next one starts.
    pub fn end_point(&self) -> Point3<f32> {
        self.local_to_world(Vector3::new(0.0, 0.0, self.length / 2.0))
    }
}

/// Collider shapes the physics layer knows how to build.
#[derive(Debug, Clone, Copy)]
pub enum SolidShape {
    /// Oriented box with the given half-extents
    Cuboid { half_extents: Vector3<f32> },
    /// Y-aligned cylinder in the solid's local frame
    CylinderY { radius: f32, half_height: f32 },
}

/// What a solid is for; decides friction/restitution/sensor flags downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidKind {
    Floor,
    Wall,
    BumperPin,
    FinishSensor,
}

/// Schema-agnostic description of one static collider.
#[derive(Debug, Clone)]
pub struct TrackSolid {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub shape: SolidShape,
    pub kind: SolidKind,
}

/// Procedural track generator with an explicit seeded random source.
///
/// Two calls with the same seed and config yield identical tracks; callers
/// that want fresh jitter reseed or use [`TrackGenerator::from_entropy`].
pub struct TrackGenerator {
    rng: ChaCha8Rng,
}

impl TrackGenerator {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate a complete track for the given config.
    ///
    /// Emits a fixed start ramp, `segment_count` randomized body segments and
    /// a fixed shallow finish segment, chained end-to-end by advancing a
    /// frontier point through each segment's own orientation.
    pub fn generate(&mut self, config: &TrackConfig) -> Result<Track, TrackError> {
        let config = config.clamped();
        let mut segments = Vec::with_capacity(config.segment_count as usize + 2);
        let mut frontier = Point3::new(START_FRONTIER[0], START_FRONTIER[1], START_FRONTIER[2]);

        // Fixed drop zone, independent of config, so spawns are always safe.
        frontier = push_segment(
            &mut segments,
            frontier,
            START_RAMP_PITCH,
            0.0,
            START_RAMP_LENGTH,
            false,
            false,
        );

        for _ in 0..config.segment_count {
            let length = self.rng.gen_range(BODY_LENGTH_MIN..BODY_LENGTH_MAX);
            let pitch = (BASE_PITCH
                + STEEPNESS_PITCH * config.steepness
                + self.rng.gen_range(-PITCH_JITTER..PITCH_JITTER))
            .clamp(MIN_PITCH, MAX_PITCH);
            let bank = (BANK_SCALE * config.banking
                + self.rng.gen_range(-BANK_JITTER..BANK_JITTER))
            .clamp(0.0, MAX_BANK);
            let has_obstacles = self.rng.gen_bool(config.chaos_level as f64);

            frontier = push_segment(
                &mut segments,
                frontier,
                pitch,
                bank,
                length,
                has_obstacles,
                false,
            );
        }

        // Shallow run-out holding the finish sensor.
        push_segment(
            &mut segments,
            frontier,
            FINISH_PITCH,
            0.0,
            FINISH_LENGTH,
            false,
            true,
        );

        validate(&segments)?;
        let pins = obstacles::scatter_pins(&segments, &mut self.rng);
        Ok(Track { segments, pins })
    }
}

/// Append one segment starting at `frontier` and return the next frontier.
fn push_segment(
    segments: &mut Vec<Segment>,
    frontier: Point3<f32>,
    pitch: f32,
    bank: f32,
    length: f32,
    has_obstacles: bool,
    is_finish: bool,
) -> Point3<f32> {
    let rotation = UnitQuaternion::from_euler_angles(pitch, 0.0, bank);
    let forward = rotation * Vector3::z();
    let position = frontier + forward * (length / 2.0);
    segments.push(Segment {
        position,
        pitch,
        bank,
        length,
        has_obstacles,
        is_finish,
    });
    frontier + forward * length
}

fn validate(segments: &[Segment]) -> Result<(), TrackError> {
    for (index, seg) in segments.iter().enumerate() {
        if !(seg.length.is_finite() && seg.length > 0.0) {
            return Err(TrackError::DegenerateSegment {
                index,
                length: seg.length,
            });
        }
        let finite = seg.position.coords.iter().all(|c| c.is_finite())
            && seg.pitch.is_finite()
            && seg.bank.is_finite();
        if !finite {
            return Err(TrackError::NonFiniteTransform { index });
        }
    }
    Ok(())
}

/// A generated track: ordered segments plus scattered bumper pins.
#[derive(Debug, Clone)]
pub struct Track {
    segments: Vec<Segment>,
    pins: Vec<Pin>,
}

impl Track {
    /// Segments in start-to-finish order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    /// The final, sensor-carrying segment.
    pub fn finish_segment(&self) -> &Segment {
        // Generation always appends the finish segment last.
        &self.segments[self.segments.len() - 1]
    }

    /// Lowest floor point; anything far below this fell off the track.
    pub fn lowest_point_y(&self) -> f32 {
        self.segments
            .iter()
            .flat_map(|s| [s.start_point().y, s.end_point().y])
            .fold(f32::INFINITY, f32::min)
    }

    /// Deterministic, collision-free spawn grid above the start ramp.
    pub fn spawn_points(&self, count: usize) -> Vec<Point3<f32>> {
        let ramp = &self.segments[0];
        let start = ramp.start_point();
        let rotation = ramp.rotation();
        (0..count)
            .map(|i| {
                let col = (i as u32 % SPAWN_COLUMNS) as f32;
                let row = (i as u32 / SPAWN_COLUMNS) as f32;
                let local = Vector3::new(
                    (col - (SPAWN_COLUMNS as f32 - 1.0) / 2.0) * SPAWN_SPACING,
                    SPAWN_CLEARANCE,
                    SPAWN_RAMP_LEAD + row * SPAWN_SPACING,
                );
                start + rotation * local
            })
            .collect()
    }

    /// Collision-solid description of the whole track.
    ///
    /// Per segment: one floor slab and two side walls, the wall offset
    /// expressed in the segment's local lateral axis and rotated through the
    /// segment orientation. Then one cylinder per pin and the finish sensor.
    pub fn solids(&self) -> Vec<TrackSolid> {
        let mut solids = Vec::with_capacity(self.segments.len() * 3 + self.pins.len() + 1);

        for seg in &self.segments {
            let rotation = seg.rotation();
            solids.push(TrackSolid {
                translation: seg.position.coords,
                rotation,
                shape: SolidShape::Cuboid {
                    half_extents: Vector3::new(
                        TRACK_WIDTH / 2.0,
                        FLOOR_THICKNESS / 2.0,
                        seg.length / 2.0,
                    ),
                },
                kind: SolidKind::Floor,
            });

            let wall_offset = (TRACK_WIDTH + WALL_THICKNESS) / 2.0;
            for side in [-1.0f32, 1.0] {
                let center = seg.local_to_world(Vector3::new(side * wall_offset, 0.0, 0.0));
                solids.push(TrackSolid {
                    translation: center.coords,
                    rotation,
                    shape: SolidShape::Cuboid {
                        half_extents: Vector3::new(
                            WALL_THICKNESS / 2.0,
                            WALL_HEIGHT / 2.0,
                            seg.length / 2.0,
                        ),
                    },
                    kind: SolidKind::Wall,
                });
            }
        }

        for pin in &self.pins {
            solids.push(TrackSolid {
                translation: pin.position.coords,
                rotation: pin.rotation,
                shape: SolidShape::CylinderY {
                    radius: PIN_RADIUS,
                    half_height: PIN_HALF_HEIGHT,
                },
                kind: SolidKind::BumperPin,
            });
        }

        let finish = self.finish_segment();
        let sensor_center = finish.local_to_world(Vector3::new(
            0.0,
            SPAWN_CLEARANCE,
            finish.length / 2.0 - FINISH_SENSOR_DEPTH,
        ));
        solids.push(TrackSolid {
            translation: sensor_center.coords,
            rotation: finish.rotation(),
            shape: SolidShape::Cuboid {
                half_extents: Vector3::new(
                    TRACK_WIDTH / 2.0,
                    FINISH_SENSOR_HALF_HEIGHT,
                    FINISH_SENSOR_DEPTH / 2.0,
                ),
            },
            kind: SolidKind::FinishSensor,
        });

        solids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const CHAIN_TOLERANCE: f32 = 1e-3;

    fn generate(seed: u64, config: TrackConfig) -> Track {
        TrackGenerator::with_seed(seed).generate(&config).unwrap()
    }

    #[test]
    fn segments_form_a_contiguous_chain() {
        let configs = [
            TrackConfig::default(),
            TrackConfig {
                segment_count: 50,
                steepness: 1.8,
                chaos_level: 1.0,
                banking: 0.5,
            },
            TrackConfig {
                segment_count: 3,
                steepness: 0.2,
                chaos_level: 0.0,
                banking: 0.0,
            },
        ];
        for (i, config) in configs.into_iter().enumerate() {
            let track = generate(100 + i as u64, config);
            for pair in track.segments().windows(2) {
                let gap = (pair[1].start_point() - pair[0].end_point()).norm();
                assert!(gap < CHAIN_TOLERANCE, "gap {gap} between segments");
            }
        }
    }

    #[test]
    fn forward_progress_is_monotonic() {
        let track = generate(7, TrackConfig::default());
        for seg in track.segments() {
            assert!(seg.end_point().z > seg.start_point().z);
        }
    }

    #[test]
    fn walls_sit_at_half_track_width_in_the_segment_frame() {
        // Max bank and steepness: exactly the geometry where a world-axis
        // wall offset would drift out of plane.
        let config = TrackConfig {
            segment_count: 8,
            steepness: 1.8,
            chaos_level: 0.0,
            banking: 0.5,
        };
        let track = generate(11, config);
        let solids = track.solids();
        let expected = (TRACK_WIDTH + WALL_THICKNESS) / 2.0;

        for (i, seg) in track.segments().iter().enumerate() {
            let floor = &solids[i * 3];
            assert_eq!(floor.kind, SolidKind::Floor);
            let inverse = seg.rotation().inverse();
            for (w, sign) in [(1usize, -1.0f32), (2, 1.0)] {
                let wall = &solids[i * 3 + w];
                assert_eq!(wall.kind, SolidKind::Wall);
                let local = inverse * (wall.translation - floor.translation);
                assert_abs_diff_eq!(local.x, sign * expected, epsilon = CHAIN_TOLERANCE);
                assert_abs_diff_eq!(local.y, 0.0, epsilon = CHAIN_TOLERANCE);
                assert_abs_diff_eq!(local.z, 0.0, epsilon = CHAIN_TOLERANCE);
            }
        }
    }

    #[test]
    fn same_seed_and_config_regenerate_identically() {
        let config = TrackConfig::default();
        let a = generate(42, config);
        let b = generate(42, config);
        assert_eq!(a.segments().len(), b.segments().len());
        for (sa, sb) in a.segments().iter().zip(b.segments()) {
            assert_eq!(sa.position, sb.position);
            assert_eq!(sa.pitch, sb.pitch);
            assert_eq!(sa.bank, sb.bank);
            assert_eq!(sa.length, sb.length);
            assert_eq!(sa.has_obstacles, sb.has_obstacles);
        }
        assert_eq!(a.pins().len(), b.pins().len());
    }

    #[test]
    fn segment_counts_include_ramp_and_finish() {
        let min = generate(
            1,
            TrackConfig {
                segment_count: 3,
                ..TrackConfig::default()
            },
        );
        assert_eq!(min.segments().len(), 5);

        let max = generate(
            2,
            TrackConfig {
                segment_count: 25,
                ..TrackConfig::default()
            },
        );
        assert_eq!(max.segments().len(), 27);
    }

    #[test]
    fn out_of_range_config_is_clamped_not_rejected() {
        let wild = TrackConfig {
            segment_count: 9999,
            steepness: -3.0,
            chaos_level: 42.0,
            banking: 8.0,
        };
        let clamped = wild.clamped();
        assert_eq!(clamped.segment_count, 50);
        assert_eq!(clamped.steepness, 0.2);
        assert_eq!(clamped.chaos_level, 1.0);
        assert_eq!(clamped.banking, 0.5);

        // The generator itself clamps too: wild input still generates.
        let track = generate(3, wild);
        assert_eq!(track.segments().len(), 52);
    }

    #[test]
    fn chaos_level_drives_obstacle_flags() {
        let calm = generate(
            4,
            TrackConfig {
                chaos_level: 0.0,
                ..TrackConfig::default()
            },
        );
        assert!(calm.segments().iter().all(|s| !s.has_obstacles));
        assert!(calm.pins().is_empty());

        let wild = generate(
            5,
            TrackConfig {
                chaos_level: 1.0,
                ..TrackConfig::default()
            },
        );
        let body = &wild.segments()[1..wild.segments().len() - 1];
        assert!(body.iter().all(|s| s.has_obstacles));
        assert!(!wild.pins().is_empty());
    }

    #[test]
    fn ramp_and_finish_have_fixed_shapes() {
        let track = generate(6, TrackConfig::default());
        let ramp = &track.segments()[0];
        assert_eq!(ramp.length, START_RAMP_LENGTH);
        assert_eq!(ramp.pitch, START_RAMP_PITCH);
        assert!(!ramp.is_finish && !ramp.has_obstacles);

        let finish = track.finish_segment();
        assert!(finish.is_finish);
        assert_eq!(finish.length, FINISH_LENGTH);
        assert_eq!(finish.pitch, FINISH_PITCH);
        assert!(
            track.segments()[..track.segments().len() - 1]
                .iter()
                .all(|s| !s.is_finish)
        );
    }

    #[test]
    fn pitch_stays_inside_the_safe_band() {
        for seed in 0..8 {
            let track = generate(
                seed,
                TrackConfig {
                    segment_count: 50,
                    steepness: 1.8,
                    chaos_level: 0.0,
                    banking: 0.5,
                },
            );
            for seg in &track.segments()[1..track.segments().len() - 1] {
                assert!(seg.pitch >= MIN_PITCH && seg.pitch <= MAX_PITCH);
                assert!(seg.bank >= 0.0 && seg.bank <= MAX_BANK);
            }
        }
    }

    #[test]
    fn spawn_points_sit_above_the_start_ramp() {
        let track = generate(8, TrackConfig::default());
        let ramp = &track.segments()[0];
        let inverse = ramp.rotation().inverse();
        for point in track.spawn_points(50) {
            let local = inverse * (point - ramp.position);
            assert!(local.x.abs() < TRACK_WIDTH / 2.0);
            assert!(local.y > 0.0);
            assert!(local.z.abs() < ramp.length / 2.0);
        }
    }

    #[test]
    fn solids_end_with_the_finish_sensor() {
        let track = generate(9, TrackConfig::default());
        let solids = track.solids();
        let sensor = solids.last().unwrap();
        assert_eq!(sensor.kind, SolidKind::FinishSensor);
        assert_eq!(
            solids
                .iter()
                .filter(|s| s.kind == SolidKind::FinishSensor)
                .count(),
            1
        );
    }
}
