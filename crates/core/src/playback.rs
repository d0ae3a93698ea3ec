//! Playback state shared between the sequencer and its observers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback state of a reading run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing in flight
    #[default]
    Idle,
    /// A unit is being spoken
    Speaking,
    /// The in-flight unit is suspended
    Paused,
    /// Every unit has been spoken
    Finished,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Speaking => "speaking",
            PlaybackState::Paused => "paused",
            PlaybackState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Completion percentage for a cursor over `len` units.
///
/// `floor(100 * cursor / len)` clamped to `[0, 100]`, and 0 for an empty sequence.
pub fn progress_percent(cursor: usize, len: usize) -> u8 {
    if len == 0 {
        return 0;
    }
    let pct = (cursor as u128 * 100) / len as u128;
    pct.min(100) as u8
}
