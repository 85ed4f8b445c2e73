//! In-Game Clock
//!
//! Simulated time, distinct from wall-clock: elapsed real time since the
//! session started, scaled by a speed multiplier and added to a configured
//! in-game start. Consulted by Time rule clauses and by the explanation
//! context snapshot.

use serde::{Deserialize, Serialize};

/// A normalized in-game time of day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameTime {
    pub hour: u32,
    pub minute: u32,
}

impl std::fmt::Display for GameTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Derive the in-game time for a session.
///
/// Elapsed real seconds × `speed` gives elapsed game seconds; those are added
/// to the configured game start, minutes carry into hours, hours wrap mod 24.
/// A `now` before `start_time_ms` (clock skew) counts as zero elapsed.
pub fn game_time(
    start_time_ms: i64,
    now_ms: i64,
    speed: f64,
    start_hour: u32,
    start_minute: u32,
) -> GameTime {
    let elapsed_secs = ((now_ms - start_time_ms).max(0) as f64) / 1000.0;
    let game_minutes = (elapsed_secs * speed / 60.0) as u64;

    let total = start_hour as u64 * 60 + start_minute as u64 + game_minutes;
    GameTime {
        hour: ((total / 60) % 24) as u32,
        minute: (total % 60) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_elapsed_is_configured_start() {
        let t = game_time(1000, 1000, 60.0, 8, 30);
        assert_eq!(t, GameTime { hour: 8, minute: 30 });
    }

    #[test]
    fn test_speed_scales_elapsed_time() {
        // 60 real seconds at 60x = 60 game minutes
        let t = game_time(0, 60_000, 60.0, 8, 0);
        assert_eq!(t, GameTime { hour: 9, minute: 0 });
    }

    #[test]
    fn test_minute_overflow_carries_into_hours() {
        // 45 game minutes on top of 8:30 → 9:15
        let t = game_time(0, 45_000, 60.0, 8, 30);
        assert_eq!(t, GameTime { hour: 9, minute: 15 });
    }

    #[test]
    fn test_hour_wraps_mod_24() {
        // 3 real minutes at 60x = 3 game hours on top of 23:00 → 02:00
        let t = game_time(0, 3 * 60 * 1000, 60.0, 23, 0);
        assert_eq!(t.hour, 2);
    }

    #[test]
    fn test_now_before_start_counts_as_zero() {
        let t = game_time(5000, 1000, 60.0, 8, 0);
        assert_eq!(t, GameTime { hour: 8, minute: 0 });
    }

    #[test]
    fn test_display_zero_pads() {
        assert_eq!(GameTime { hour: 8, minute: 5 }.to_string(), "08:05");
    }
}
