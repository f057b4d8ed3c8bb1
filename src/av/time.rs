//! Clock domains.
//!
//! The player counts in microseconds (`PLAYER_TIME_BASE`), the decoder's
//! timestamp registers run at 90 kHz (`PTS_FREQ`) and frame durations are
//! handed to the decoder in 96 kHz units (`UNIT_FREQ`).

/// Decoder timestamp ticks per second.
pub const PTS_FREQ: i64 = 90_000;

/// Decoder frame-rate units per second.
pub const UNIT_FREQ: u32 = 96_000;

/// Player clock ticks per second.
pub const PLAYER_TIME_BASE: f64 = 1_000_000.0;

/// Converts a player timestamp to decoder ticks, rounding half up.
pub fn player_to_pts(value: f64) -> i64 {
    (0.5 + value * PTS_FREQ as f64 / PLAYER_TIME_BASE) as i64
}

/// Converts decoder ticks to seconds.
pub fn pts_to_seconds(pts: i64) -> f64 {
    pts as f64 / PTS_FREQ as f64
}

/// Converts seconds to decoder ticks, truncating.
pub fn seconds_to_pts(seconds: f64) -> i64 {
    (seconds * PTS_FREQ as f64) as i64
}

/// Frame duration in decoder units for a `rate / scale` frames-per-second pair.
pub fn frame_duration_units(rate: u32, scale: u32) -> u32 {
    (0.5 + UNIT_FREQ as f64 * scale as f64 / rate as f64) as u32
}

/// Frame duration in player ticks for a duration in decoder units.
pub fn units_to_player(units: u32) -> f64 {
    units as f64 * PLAYER_TIME_BASE / UNIT_FREQ as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_conversion_rounds() {
        assert_eq!(player_to_pts(0.0), 0);
        assert_eq!(player_to_pts(1_000_000.0), 90_000);
        // 11.11us is 0.9999 ticks
        assert_eq!(player_to_pts(11.11), 1);
        assert_eq!(seconds_to_pts(1.5), 135_000);
        assert_eq!(pts_to_seconds(45_000), 0.5);
    }

    #[test]
    fn frame_units() {
        assert_eq!(frame_duration_units(30000, 1001), 3203);
        assert_eq!(frame_duration_units(25, 1), 3840);
        assert_eq!(units_to_player(3840), 40_000.0);
    }
}
