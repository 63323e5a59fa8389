//! Calendar-derived categorical features

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Meteorological season, labelled the way the historical records spell it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    /// Dec-Feb Winter, Mar-May Spring, Jun-Aug Summer, Sep-Nov Autumn.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

/// Demand-shaped bucketing of the hour of day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HourBucket {
    MorningRush,
    Daytime,
    EveningRush,
    Evening,
    Night,
}

impl HourBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=9 => HourBucket::MorningRush,
            10..=16 => HourBucket::Daytime,
            17..=19 => HourBucket::EveningRush,
            20..=23 => HourBucket::Evening,
            _ => HourBucket::Night,
        }
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses the timestamp spellings used by the forecast collector and by the
/// training rows (`date` + `hour`). RFC 3339 offsets are dropped: the
/// calendar features are local-time features.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Calendar facts of one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub hour: u32,
    pub month: u32,
    pub season: Season,
    pub hour_bucket: HourBucket,
}

impl CalendarFeatures {
    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        let hour = ts.hour();
        let month = ts.month();
        Self {
            hour,
            month,
            season: Season::from_month(month),
            hour_bucket: HourBucket::from_hour(hour),
        }
    }
}
