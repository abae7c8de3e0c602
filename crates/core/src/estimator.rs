//! Size-based duration estimate for the simulated enhancement phase.
//!
//! The remote job exposes no progress of its own, so the client advances
//! a percentage purely by elapsed time. The expected duration is tiered
//! by input size and split into a fixed number of equal ticks; the
//! simulated value is capped one short of completion so that only the
//! completion event can finish a job.

use std::time::Duration;

use crate::types::Percent;

// ---------------------------------------------------------------------------
// Size tiers
// ---------------------------------------------------------------------------

/// Bytes per megabyte (binary, 1024 * 1024).
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Files strictly below this size (in MB) use the small-file estimate.
pub const SMALL_FILE_LIMIT_MB: u64 = 5;
/// Files up to and including this size (in MB) use the medium estimate.
pub const MEDIUM_FILE_LIMIT_MB: u64 = 20;

/// Estimated duration for files under 5 MB.
pub const SMALL_FILE_DURATION_MS: u64 = 40_000;
/// Estimated duration for files from 5 MB to 20 MB inclusive.
pub const MEDIUM_FILE_DURATION_MS: u64 = 90_000;
/// Estimated duration for files over 20 MB.
pub const LARGE_FILE_DURATION_MS: u64 = 120_000;

// ---------------------------------------------------------------------------
// Tick shape
// ---------------------------------------------------------------------------

/// Number of equal ticks the estimated duration is divided into.
pub const TICKS_PER_ESTIMATE: u32 = 100;

/// Highest percentage the simulation may reach on its own.
pub const MAX_SIMULATED_PERCENT: Percent = 99;

/// Size class of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    Small,
    Medium,
    Large,
}

impl SizeTier {
    /// Classify a file by its length in bytes.
    pub fn from_size(file_size_bytes: u64) -> Self {
        if file_size_bytes < SMALL_FILE_LIMIT_MB * BYTES_PER_MB {
            Self::Small
        } else if file_size_bytes <= MEDIUM_FILE_LIMIT_MB * BYTES_PER_MB {
            Self::Medium
        } else {
            Self::Large
        }
    }

    /// Expected remote processing time for this tier.
    pub fn duration(self) -> Duration {
        let ms = match self {
            Self::Small => SMALL_FILE_DURATION_MS,
            Self::Medium => MEDIUM_FILE_DURATION_MS,
            Self::Large => LARGE_FILE_DURATION_MS,
        };
        Duration::from_millis(ms)
    }
}

/// Estimated remote processing time for a file of the given size.
pub fn estimated_duration(file_size_bytes: u64) -> Duration {
    SizeTier::from_size(file_size_bytes).duration()
}

/// Time between two simulated ticks for an estimated duration.
pub fn tick_interval(duration: Duration) -> Duration {
    duration / TICKS_PER_ESTIMATE
}

/// The value the simulation moves to after `current`, or `None` once the
/// cap has been reached.
pub fn next_simulated_percent(current: Percent) -> Option<Percent> {
    if current >= MAX_SIMULATED_PERCENT {
        None
    } else {
        Some(current + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_megabytes_is_small() {
        let d = estimated_duration(2 * BYTES_PER_MB);
        assert_eq!(d, Duration::from_millis(40_000));
        assert_eq!(tick_interval(d), Duration::from_millis(400));
    }

    #[test]
    fn ten_megabytes_is_medium() {
        let d = estimated_duration(10 * BYTES_PER_MB);
        assert_eq!(d, Duration::from_millis(90_000));
        assert_eq!(tick_interval(d), Duration::from_millis(900));
    }

    #[test]
    fn thirty_megabytes_is_large() {
        let d = estimated_duration(30 * BYTES_PER_MB);
        assert_eq!(d, Duration::from_millis(120_000));
        assert_eq!(tick_interval(d), Duration::from_millis(1200));
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(SizeTier::from_size(0), SizeTier::Small);
        assert_eq!(SizeTier::from_size(5 * BYTES_PER_MB - 1), SizeTier::Small);
        assert_eq!(SizeTier::from_size(5 * BYTES_PER_MB), SizeTier::Medium);
        assert_eq!(SizeTier::from_size(20 * BYTES_PER_MB), SizeTier::Medium);
        assert_eq!(SizeTier::from_size(20 * BYTES_PER_MB + 1), SizeTier::Large);
    }

    #[test]
    fn simulation_stops_at_cap() {
        assert_eq!(next_simulated_percent(0), Some(1));
        assert_eq!(next_simulated_percent(98), Some(99));
        assert_eq!(next_simulated_percent(99), None);
        assert_eq!(next_simulated_percent(100), None);
    }
}
