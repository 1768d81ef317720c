//! Event context: time-of-day bucket and trip phase

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Coarse time-of-day bucket derived from the local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// 05:00 - 10:59
    Morning,
    /// 11:00 - 16:59
    Midday,
    /// 17:00 - 21:59
    Evening,
    /// 22:00 - 04:59
    Night,
}

impl TimeBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => Self::Morning,
            11..=16 => Self::Midday,
            17..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// Bucket for an instant, evaluated at the given local offset
    pub fn at(timestamp: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::from_hour(timestamp.with_timezone(&offset).hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Midday => "midday",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the current trip when the action happened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    Departure,
    Cruising,
    Arrival,
    #[default]
    Unknown,
}

impl FromStr for TripPhase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "departure" | "start" => Ok(Self::Departure),
            "cruising" | "cruise" => Ok(Self::Cruising),
            "arrival" | "end" => Ok(Self::Arrival),
            "" | "unknown" => Ok(Self::Unknown),
            other => Err(ValidationError::UnknownTripPhase(other.to_string())),
        }
    }
}

/// Context attached to every normalized event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub time_bucket: TimeBucket,
    pub trip_phase: TripPhase,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(TimeBucket::from_hour(4), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(10), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(11), TimeBucket::Midday);
        assert_eq!(TimeBucket::from_hour(17), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(22), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(0), TimeBucket::Night);
    }

    #[test]
    fn test_bucket_uses_local_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 3, 30, 0).unwrap();
        assert_eq!(TimeBucket::at(ts, FixedOffset::east_opt(0).unwrap()), TimeBucket::Night);
        // 03:30 UTC is 08:30 at UTC+5
        assert_eq!(
            TimeBucket::at(ts, FixedOffset::east_opt(5 * 3600).unwrap()),
            TimeBucket::Morning
        );
    }

    #[test]
    fn test_trip_phase_parse() {
        assert_eq!("Departure".parse::<TripPhase>().unwrap(), TripPhase::Departure);
        assert_eq!("".parse::<TripPhase>().unwrap(), TripPhase::Unknown);
        assert!("parked".parse::<TripPhase>().is_err());
    }
}
