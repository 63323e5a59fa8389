use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::dataset::catalog::{forecast, seoul, WEATHER_FORECAST_DATASET};
use crate::dataset::{read_bytes, DatasetError, Record, Table};
use crate::features::{RawObservation, TransformError};

/// Forecast visibility is reported in metres; the historical records use
/// units of 10 m.
pub const FORECAST_VISIBILITY_DIVISOR: f64 = 10.0;

/// One historical hour with its observed demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub observation: RawObservation,
    pub rented_bike_count: f64,
}

impl TrainingRecord {
    /// Builds a training row from a clean `seoul_bike_sharing` record.
    pub fn from_record(record: &Record<'_>) -> Result<Self, TransformError> {
        let date = record
            .get(seoul::DATE)
            .ok_or(TransformError::MissingField(seoul::DATE))?;
        let hour = record
            .get_f64(seoul::HOUR)
            .ok_or(TransformError::MissingField(seoul::HOUR))?;
        let rented_bike_count = record
            .get_f64(seoul::RENTED_BIKE_COUNT)
            .ok_or(TransformError::MissingField(seoul::RENTED_BIKE_COUNT))?;
        if !(0.0..24.0).contains(&hour) || hour.fract() != 0.0 {
            return Err(TransformError::InvalidTimestamp(format!("{date} hour {hour}")));
        }

        let observation = RawObservation {
            timestamp: Some(format!("{date} {:02}:00:00", hour as u32)),
            temperature: record.get_f64(seoul::TEMPERATURE),
            humidity: record.get_f64(seoul::HUMIDITY),
            wind_speed: record.get_f64(seoul::WIND_SPEED),
            visibility: record.get_f64(seoul::VISIBILITY),
            dew_point: record.get_f64(seoul::DEW_POINT),
            solar_radiation: record.get_f64(seoul::SOLAR_RADIATION),
            rainfall: record.get_f64(seoul::RAINFALL),
            snowfall: record.get_f64(seoul::SNOWFALL),
            season: record.get(seoul::SEASONS).map(str::to_string),
            holiday: record.get(seoul::HOLIDAY).map(str::to_string),
            functioning_day: record.get(seoul::FUNCTIONING_DAY).map(str::to_string),
        };

        Ok(Self {
            observation,
            rented_bike_count,
        })
    }
}

/// Live forecast row keyed by (entity, timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub entity: String,
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Already converted to training units.
    pub visibility: Option<f64>,
}

impl ForecastRecord {
    /// `None` when the record has no entity name.
    pub fn from_record(record: &Record<'_>) -> Option<Self> {
        Some(Self {
            entity: record.get(forecast::CITY)?.to_string(),
            timestamp: record.get(forecast::FORECAST_DATETIME).map(str::to_string),
            temperature: record.get_f64(forecast::TEMP),
            humidity: record.get_f64(forecast::HUMIDITY),
            wind_speed: record.get_f64(forecast::WIND_SPEED),
            visibility: record
                .get_f64(forecast::VISIBILITY)
                .map(|v| v / FORECAST_VISIBILITY_DIVISOR),
        })
    }

    pub fn to_observation(&self) -> RawObservation {
        RawObservation {
            timestamp: self.timestamp.clone(),
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            visibility: self.visibility,
            ..Default::default()
        }
    }
}

/// A forecast file as read at one point in time. `version` is a content
/// hash, so an unchanged file keeps its version across reloads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastBatch {
    pub version: String,
    pub records: Vec<ForecastRecord>,
}

impl ForecastBatch {
    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self, DatasetError> {
        let table = Table::parse_csv(bytes, origin)?;
        table.validate(&WEATHER_FORECAST_DATASET.clean_schema())?;

        let records: Vec<ForecastRecord> = table
            .records()
            .filter_map(|r| ForecastRecord::from_record(&r))
            .collect();
        let skipped = table.len() - records.len();
        if skipped > 0 {
            tracing::warn!(skipped, path = %origin.display(), "forecast rows without a city skipped");
        }

        Ok(Self {
            version: content_version(bytes),
            records,
        })
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        Self::from_bytes(&read_bytes(path)?, path)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn content_version(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..16].to_string()
}
