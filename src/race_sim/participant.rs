//! Participant - Racer identity and roster helpers
//!
//! Participants come from an external follower-data loader or from the
//! built-in mock generator. They are read-only once a race is running.

use serde::{Deserialize, Serialize};

/// Hard cap on roster size; larger uploads are truncated.
pub const MAX_ROSTER: usize = 50;

/// Opaque participant token, unique within a roster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ParticipantId(u32);

impl ParticipantId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Marble tint, forwarded untouched to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A single racer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique token, also used as the marble's trigger identity
    pub id: ParticipantId,
    /// Display name
    pub username: String,
    /// Marble color
    pub color: Rgb,
    /// Opaque avatar reference (display only, never consulted by physics)
    pub avatar: Option<String>,
}

/// Derive a stable 24-bit color from a username.
///
/// Same DJB2-style mix the follower loader uses, so a given username keeps
/// its color across uploads.
pub fn color_for_username(username: &str) -> Rgb {
    let mut hash: i32 = 0;
    for c in username.chars() {
        hash = (c as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    let v = (hash & 0x00FF_FFFF) as u32;
    Rgb {
        r: ((v >> 16) & 0xFF) as u8,
        g: ((v >> 8) & 0xFF) as u8,
        b: (v & 0xFF) as u8,
    }
}

/// Generate `count` synthetic racers for demo races without uploaded data.
pub fn mock_roster(count: usize) -> Vec<Participant> {
    (0..count.min(MAX_ROSTER))
        .map(|i| {
            let username = format!("racer_{}", i + 1);
            let color = color_for_username(&username);
            Participant {
                id: ParticipantId::new(i as u32),
                username,
                color,
                avatar: None,
            }
        })
        .collect()
}
