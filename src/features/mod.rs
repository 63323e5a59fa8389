//! Feature transformer
//!
//! Maps raw observations (historical training rows or live forecast rows) to
//! model-ready numeric vectors. The scaling constants and categorical level
//! lists are computed once by [`FeatureTransformer::fit`] and frozen into a
//! [`TransformerState`]; [`FeatureTransformer::apply`] only ever reads them.
//! Refitting on a live batch would shift every downstream prediction, so the
//! state travels with the model artifact it was fit for.
//!
//! # Feature layout
//! 1. min-max scaled bounded fields: `hour`, `humidity`
//! 2. z-scored fields: `temperature`, `wind_speed`, `visibility`, `dew_point`,
//!    `solar_radiation`, `rainfall`, `snowfall`
//! 3. one-hot columns `<field>_<level>` for `season`, `holiday`,
//!    `functioning_day`, `hour_bucket`, levels in sorted order

pub mod calendar;
pub mod scaling;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};
use thiserror::Error;

use crate::ml::FeatureVector;
use calendar::{parse_timestamp, CalendarFeatures};
use scaling::{MinMaxScaler, ZScoreScaler};

/// Bumped whenever the feature layout changes; artifacts with another
/// version are rejected at load time.
pub const TRANSFORMER_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_HOLIDAY: &str = "No Holiday";
pub const DEFAULT_FUNCTIONING_DAY: &str = "Yes";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("schema mismatch on '{field}': {detail}")]
    SchemaMismatch { field: String, detail: String },

    #[error("cannot fit a transformer on an empty training set")]
    EmptyTrainingSet,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BoundedField {
    Hour,
    Humidity,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContinuousField {
    Temperature,
    WindSpeed,
    Visibility,
    DewPoint,
    SolarRadiation,
    Rainfall,
    Snowfall,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CategoricalField {
    Season,
    Holiday,
    FunctioningDay,
    HourBucket,
}

/// Raw observation accepted by the transformer.
///
/// Training rows fill every field. Live forecast rows leave
/// `solar_radiation`, `rainfall`, `snowfall`, `dew_point` and the
/// categorical fields empty; see [`FeatureTransformer::resolve`] for the
/// defaults applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub visibility: Option<f64>,
    pub dew_point: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub rainfall: Option<f64>,
    pub snowfall: Option<f64>,
    pub season: Option<String>,
    pub holiday: Option<String>,
    pub functioning_day: Option<String>,
}

/// An observation with defaults applied and calendar fields derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedObservation {
    pub hour: f64,
    pub humidity: f64,
    pub temperature: f64,
    pub wind_speed: f64,
    pub visibility: f64,
    pub dew_point: f64,
    pub solar_radiation: f64,
    pub rainfall: f64,
    pub snowfall: f64,
    pub season: String,
    pub holiday: String,
    pub functioning_day: String,
    pub hour_bucket: String,
}

impl ResolvedObservation {
    pub fn bounded(&self, field: BoundedField) -> f64 {
        match field {
            BoundedField::Hour => self.hour,
            BoundedField::Humidity => self.humidity,
        }
    }

    pub fn continuous(&self, field: ContinuousField) -> f64 {
        match field {
            ContinuousField::Temperature => self.temperature,
            ContinuousField::WindSpeed => self.wind_speed,
            ContinuousField::Visibility => self.visibility,
            ContinuousField::DewPoint => self.dew_point,
            ContinuousField::SolarRadiation => self.solar_radiation,
            ContinuousField::Rainfall => self.rainfall,
            ContinuousField::Snowfall => self.snowfall,
        }
    }

    pub fn categorical(&self, field: CategoricalField) -> &str {
        match field {
            CategoricalField::Season => &self.season,
            CategoricalField::Holiday => &self.holiday,
            CategoricalField::FunctioningDay => &self.functioning_day,
            CategoricalField::HourBucket => &self.hour_bucket,
        }
    }
}

/// Frozen transformer constants. Versioned and persisted with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerState {
    pub schema_version: u32,
    pub bounded: BTreeMap<BoundedField, MinMaxScaler>,
    pub continuous: BTreeMap<ContinuousField, ZScoreScaler>,
    pub levels: BTreeMap<CategoricalField, Vec<String>>,
    pub feature_names: Vec<String>,
    pub training_rows: usize,
}

impl TransformerState {
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    fn expected_feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BoundedField::iter()
            .map(|f| f.as_ref().to_string())
            .chain(ContinuousField::iter().map(|f| f.as_ref().to_string()))
            .collect();
        for field in CategoricalField::iter() {
            if let Some(levels) = self.levels.get(&field) {
                names.extend(levels.iter().map(|lvl| format!("{}_{}", field.as_ref(), lvl)));
            }
        }
        names
    }

    /// Structural self-check run when a persisted state is loaded.
    pub fn validate(&self) -> Result<(), TransformError> {
        let mismatch = |field: &str, detail: String| TransformError::SchemaMismatch {
            field: field.to_string(),
            detail,
        };

        if self.schema_version != TRANSFORMER_SCHEMA_VERSION {
            return Err(mismatch(
                "schema_version",
                format!("expected {TRANSFORMER_SCHEMA_VERSION}, found {}", self.schema_version),
            ));
        }
        if let Some(f) = BoundedField::iter().find(|f| !self.bounded.contains_key(f)) {
            return Err(mismatch(f.as_ref(), "no min/max constants".to_string()));
        }
        if let Some(f) = ContinuousField::iter().find(|f| !self.continuous.contains_key(f)) {
            return Err(mismatch(f.as_ref(), "no mean/stddev constants".to_string()));
        }
        for field in CategoricalField::iter() {
            match self.levels.get(&field) {
                Some(levels) if !levels.is_empty() => {}
                _ => return Err(mismatch(field.as_ref(), "no fitted levels".to_string())),
            }
        }
        self.validate_feature_names(&self.expected_feature_names())
    }

    /// Rejects any feature layout other than this state's own.
    pub fn validate_feature_names(&self, names: &[String]) -> Result<(), TransformError> {
        if names != self.feature_names.as_slice() {
            return Err(TransformError::SchemaMismatch {
                field: "feature_names".to_string(),
                detail: format!(
                    "expected {} features {:?}, found {} {:?}",
                    self.feature_names.len(),
                    self.feature_names,
                    names.len(),
                    names
                ),
            });
        }
        Ok(())
    }
}

pub struct FeatureTransformer;

impl FeatureTransformer {
    /// Applies live-row defaults and derives calendar fields.
    ///
    /// Defaults: solar radiation, rainfall and snowfall 0; dew point
    /// `temperature - (100 - humidity) / 5`; holiday `No Holiday`;
    /// functioning day `Yes`; season from the timestamp month unless given.
    pub fn resolve(row: &RawObservation) -> Result<ResolvedObservation, TransformError> {
        let raw_ts = row
            .timestamp
            .as_deref()
            .ok_or(TransformError::MissingField("timestamp"))?;
        let ts = parse_timestamp(raw_ts)
            .ok_or_else(|| TransformError::InvalidTimestamp(raw_ts.to_string()))?;
        let calendar = CalendarFeatures::from_timestamp(&ts);

        let temperature = row
            .temperature
            .ok_or(TransformError::MissingField("temperature"))?;
        let humidity = row.humidity.ok_or(TransformError::MissingField("humidity"))?;
        let wind_speed = row
            .wind_speed
            .ok_or(TransformError::MissingField("wind_speed"))?;
        let visibility = row
            .visibility
            .ok_or(TransformError::MissingField("visibility"))?;
        let dew_point = row
            .dew_point
            .unwrap_or_else(|| derive_dew_point(temperature, humidity));

        Ok(ResolvedObservation {
            hour: calendar.hour as f64,
            humidity,
            temperature,
            wind_speed,
            visibility,
            dew_point,
            solar_radiation: row.solar_radiation.unwrap_or(0.0),
            rainfall: row.rainfall.unwrap_or(0.0),
            snowfall: row.snowfall.unwrap_or(0.0),
            season: row
                .season
                .clone()
                .unwrap_or_else(|| calendar.season.to_string()),
            holiday: row
                .holiday
                .clone()
                .unwrap_or_else(|| DEFAULT_HOLIDAY.to_string()),
            functioning_day: row
                .functioning_day
                .clone()
                .unwrap_or_else(|| DEFAULT_FUNCTIONING_DAY.to_string()),
            hour_bucket: calendar.hour_bucket.to_string(),
        })
    }

    /// Computes every constant over the full training set. Fails on the
    /// first row that cannot be resolved.
    pub fn fit(rows: &[RawObservation]) -> Result<TransformerState, TransformError> {
        if rows.is_empty() {
            return Err(TransformError::EmptyTrainingSet);
        }
        let resolved = rows
            .iter()
            .map(Self::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        let bounded = BoundedField::iter()
            .filter_map(|f| MinMaxScaler::fit(resolved.iter().map(|r| r.bounded(f))).map(|s| (f, s)))
            .collect();
        let continuous = ContinuousField::iter()
            .filter_map(|f| ZScoreScaler::fit(resolved.iter().map(|r| r.continuous(f))).map(|s| (f, s)))
            .collect();
        let levels = CategoricalField::iter()
            .map(|f| {
                let set: BTreeSet<String> = resolved
                    .iter()
                    .map(|r| r.categorical(f).to_string())
                    .collect();
                (f, set.into_iter().collect::<Vec<_>>())
            })
            .collect();

        let mut state = TransformerState {
            schema_version: TRANSFORMER_SCHEMA_VERSION,
            bounded,
            continuous,
            levels,
            feature_names: Vec::new(),
            training_rows: rows.len(),
        };
        state.feature_names = state.expected_feature_names();

        tracing::debug!(
            training_rows = state.training_rows,
            features = state.feature_count(),
            "transformer fitted"
        );
        Ok(state)
    }

    /// Encodes one observation with frozen constants. Pure and deterministic.
    pub fn apply(state: &TransformerState, row: &RawObservation) -> Result<FeatureVector, TransformError> {
        let resolved = Self::resolve(row)?;
        let mut values = Vec::with_capacity(state.feature_count());

        for (field, scaler) in &state.bounded {
            values.push(scaler.normalize(resolved.bounded(*field)));
        }
        for (field, scaler) in &state.continuous {
            values.push(scaler.normalize(resolved.continuous(*field)));
        }
        for (field, levels) in &state.levels {
            let value = resolved.categorical(*field);
            if !levels.iter().any(|lvl| lvl == value) {
                return Err(TransformError::SchemaMismatch {
                    field: field.as_ref().to_string(),
                    detail: format!("value '{value}' is not one of the fitted levels {levels:?}"),
                });
            }
            values.extend(levels.iter().map(|lvl| if lvl == value { 1.0 } else { 0.0 }));
        }

        if values.len() != state.feature_count() {
            return Err(TransformError::SchemaMismatch {
                field: "feature_names".to_string(),
                detail: format!(
                    "state declares {} features but encodes {}",
                    state.feature_count(),
                    values.len()
                ),
            });
        }

        Ok(FeatureVector {
            features: values,
            feature_names: state.feature_names.clone(),
        })
    }
}

pub fn derive_dew_point(temperature: f64, humidity: f64) -> f64 {
    temperature - ((100.0 - humidity) / 5.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn training_row(ts: &str, temperature: f64, humidity: f64, season: &str) -> RawObservation {
        RawObservation {
            timestamp: Some(ts.to_string()),
            temperature: Some(temperature),
            humidity: Some(humidity),
            wind_speed: Some(1.5),
            visibility: Some(2000.0),
            dew_point: Some(derive_dew_point(temperature, humidity)),
            solar_radiation: Some(0.0),
            rainfall: Some(0.0),
            snowfall: Some(0.0),
            season: Some(season.to_string()),
            holiday: Some("No Holiday".to_string()),
            functioning_day: Some("Yes".to_string()),
        }
    }

    fn training_set() -> Vec<RawObservation> {
        let mut rows = vec![
            training_row("2017-12-01 00:00:00", -5.2, 37.0, "Winter"),
            training_row("2018-04-10 08:00:00", 12.0, 55.0, "Spring"),
            training_row("2018-07-14 13:00:00", 30.5, 70.0, "Summer"),
            training_row("2018-10-03 18:00:00", 15.0, 60.0, "Autumn"),
            training_row("2018-10-03 21:00:00", 13.0, 65.0, "Autumn"),
        ];
        rows[1].rainfall = Some(2.5);
        rows[2].solar_radiation = Some(1.8);
        rows[3].holiday = Some("Holiday".to_string());
        rows[4].functioning_day = Some("No".to_string());
        rows[0].snowfall = Some(0.4);
        rows
    }

    #[test]
    fn test_fit_levels_and_layout() {
        let state = FeatureTransformer::fit(&training_set()).unwrap();
        assert!(state.validate().is_ok());
        assert_eq!(
            state.levels[&CategoricalField::Season],
            vec!["Autumn", "Spring", "Summer", "Winter"]
        );
        assert_eq!(state.levels[&CategoricalField::HourBucket].len(), 5);
        assert_eq!(state.feature_names[0], "hour");
        assert_eq!(state.feature_names[1], "humidity");
        assert_eq!(state.feature_names[2], "temperature");
        assert!(state.feature_names.contains(&"season_Winter".to_string()));
        assert!(state.feature_names.contains(&"hour_bucket_MORNING_RUSH".to_string()));
        // 2 bounded + 7 continuous + 4 seasons + 2 holiday + 2 functioning + 5 buckets
        assert_eq!(state.feature_count(), 22);
        assert_eq!(state.bounded[&BoundedField::Hour], MinMaxScaler { min: 0.0, max: 21.0 });
    }

    #[test]
    fn test_fit_empty_fails() {
        assert_eq!(FeatureTransformer::fit(&[]), Err(TransformError::EmptyTrainingSet));
    }

    #[test]
    fn test_fit_fails_on_bad_row() {
        let mut rows = training_set();
        rows[2].timestamp = Some("not a time".to_string());
        assert!(matches!(
            FeatureTransformer::fit(&rows),
            Err(TransformError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_apply_one_hot_and_scaling() {
        let state = FeatureTransformer::fit(&training_set()).unwrap();
        let fv = FeatureTransformer::apply(&state, &training_set()[2]).unwrap();
        assert_eq!(fv.len(), state.feature_count());
        assert_eq!(fv.feature_names, state.feature_names);

        let idx = |name: &str| state.feature_names.iter().position(|n| n == name).unwrap();
        assert_eq!(fv.features[idx("season_Summer")], 1.0);
        assert_eq!(fv.features[idx("season_Winter")], 0.0);
        assert_eq!(fv.features[idx("hour_bucket_DAYTIME")], 1.0);
        let humidity = state.bounded[&BoundedField::Humidity];
        assert_eq!(fv.features[idx("humidity")], humidity.normalize(70.0));
    }

    #[test]
    fn test_apply_missing_required_field() {
        let state = FeatureTransformer::fit(&training_set()).unwrap();
        let mut row = training_set()[0].clone();
        row.wind_speed = None;
        assert_eq!(
            FeatureTransformer::apply(&state, &row),
            Err(TransformError::MissingField("wind_speed"))
        );
        row.timestamp = None;
        assert_eq!(
            FeatureTransformer::apply(&state, &row),
            Err(TransformError::MissingField("timestamp"))
        );
    }

    #[test]
    fn test_apply_invalid_timestamp() {
        let state = FeatureTransformer::fit(&training_set()).unwrap();
        let mut row = training_set()[0].clone();
        row.timestamp = Some("31/31/2018 99".to_string());
        assert!(matches!(
            FeatureTransformer::apply(&state, &row),
            Err(TransformError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_apply_unseen_category_is_schema_mismatch() {
        let state = FeatureTransformer::fit(&training_set()).unwrap();
        let mut row = training_set()[0].clone();
        row.holiday = Some("Festival".to_string());
        match FeatureTransformer::apply(&state, &row) {
            Err(TransformError::SchemaMismatch { field, .. }) => assert_eq!(field, "holiday"),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unseen_derived_bucket_is_schema_mismatch() {
        // Fit only on night hours: a daytime live row cannot be encoded.
        let rows = vec![
            training_row("2018-01-01 01:00:00", -3.0, 40.0, "Winter"),
            training_row("2018-01-01 02:00:00", -4.0, 42.0, "Winter"),
        ];
        let state = FeatureTransformer::fit(&rows).unwrap();
        let live = RawObservation {
            timestamp: Some("2018-01-02 12:00:00".to_string()),
            temperature: Some(0.0),
            humidity: Some(50.0),
            wind_speed: Some(1.0),
            visibility: Some(2000.0),
            ..Default::default()
        };
        assert!(matches!(
            FeatureTransformer::apply(&state, &live),
            Err(TransformError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_live_row_defaults_match_training_row() {
        let state = FeatureTransformer::fit(&training_set()).unwrap();
        let training = training_row("2018-07-20 13:00:00", 25.0, 60.0, "Summer");
        let live = RawObservation {
            timestamp: Some("2018-07-20 13:00:00".to_string()),
            temperature: Some(25.0),
            humidity: Some(60.0),
            wind_speed: Some(1.5),
            visibility: Some(2000.0),
            ..Default::default()
        };

        let a = FeatureTransformer::apply(&state, &training).unwrap();
        let b = FeatureTransformer::apply(&state, &live).unwrap();
        assert_eq!(a, b);

        let resolved = FeatureTransformer::resolve(&live).unwrap();
        assert_eq!(resolved.dew_point, 25.0 - (100.0 - 60.0) / 5.0);
        assert_eq!(resolved.rainfall, 0.0);
        assert_eq!(resolved.season, "Summer");
    }

    #[test]
    fn test_validate_rejects_drifted_layout() {
        let mut state = FeatureTransformer::fit(&training_set()).unwrap();
        state
            .levels
            .get_mut(&CategoricalField::Season)
            .unwrap()
            .push("Monsoon".to_string());
        assert!(matches!(
            state.validate(),
            Err(TransformError::SchemaMismatch { .. })
        ));

        let mut state = FeatureTransformer::fit(&training_set()).unwrap();
        state.schema_version += 1;
        assert!(state.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_apply_is_deterministic(
            hour in 0u32..24,
            temperature in -20.0f64..40.0,
            humidity in 0.0f64..100.0,
            wind in 0.0f64..10.0,
        ) {
            let state = FeatureTransformer::fit(&training_set()).unwrap();
            let row = RawObservation {
                timestamp: Some(format!("2018-10-05 {hour:02}:00:00")),
                temperature: Some(temperature),
                humidity: Some(humidity),
                wind_speed: Some(wind),
                visibility: Some(1500.0),
                ..Default::default()
            };
            let first = FeatureTransformer::apply(&state, &row);
            let second = FeatureTransformer::apply(&state, &row);
            prop_assert_eq!(first, second);
        }
    }
}
