//! Fixed dataset contracts.
//!
//! Each definition pins the raw collector schema, how raw columns map to the
//! clean schema, and the cleaning rules the wrangler applies.

use super::DatasetSchema;
use std::path::{Path, PathBuf};

pub const BIKE_SHARING_SYSTEMS: &str = "bike_sharing_systems";
pub const WEATHER_FORECAST: &str = "weather_forecast";
pub const WORLD_CITIES: &str = "world_cities";
pub const SEOUL_BIKE_SHARING: &str = "seoul_bike_sharing";

/// Clean column names of the historical rental records.
pub mod seoul {
    pub const DATE: &str = "date";
    pub const RENTED_BIKE_COUNT: &str = "rented_bike_count";
    pub const HOUR: &str = "hour";
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const WIND_SPEED: &str = "wind_speed";
    pub const VISIBILITY: &str = "visibility";
    pub const DEW_POINT: &str = "dew_point_temperature";
    pub const SOLAR_RADIATION: &str = "solar_radiation";
    pub const RAINFALL: &str = "rainfall";
    pub const SNOWFALL: &str = "snowfall";
    pub const SEASONS: &str = "seasons";
    pub const HOLIDAY: &str = "holiday";
    pub const FUNCTIONING_DAY: &str = "functioning_day";
}

/// Clean column names of the live weather forecast.
pub mod forecast {
    pub const CITY: &str = "city";
    pub const WEATHER: &str = "weather";
    pub const VISIBILITY: &str = "visibility";
    pub const TEMP: &str = "temp";
    pub const TEMP_MIN: &str = "temp_min";
    pub const TEMP_MAX: &str = "temp_max";
    pub const PRESSURE: &str = "pressure";
    pub const HUMIDITY: &str = "humidity";
    pub const WIND_SPEED: &str = "wind_speed";
    pub const WIND_DEG: &str = "wind_deg";
    pub const FORECAST_DATETIME: &str = "forecast_datetime";
}

/// Clean column names of the geographic reference table.
pub mod cities {
    pub const CITY: &str = "city";
    pub const CITY_ASCII: &str = "city_ascii";
    pub const LAT: &str = "lat";
    pub const LNG: &str = "lng";
    pub const COUNTRY: &str = "country";
    pub const ISO2: &str = "iso2";
    pub const ISO3: &str = "iso3";
    pub const POPULATION: &str = "population";
}

/// Clean column names of the bike-sharing systems inventory.
pub mod systems {
    pub const COUNTRY: &str = "country";
    pub const CITY: &str = "city";
    pub const SYSTEM: &str = "system";
    pub const BICYCLES: &str = "bicycles";
}

#[derive(Debug, Clone)]
pub struct DatasetDefinition {
    pub name: &'static str,
    pub raw_columns: &'static [&'static str],
    /// (raw column, clean column), in clean order. Raw columns not listed are dropped.
    pub mappings: &'static [(&'static str, &'static str)],
    /// Rows missing any of these clean columns are dropped.
    pub required: &'static [&'static str],
    /// Clean columns parsed as numbers; unparsable cells become blank.
    pub numeric: &'static [&'static str],
    /// Numeric clean columns whose blanks are filled with the column mean.
    pub impute_mean: &'static [&'static str],
    /// Clean column holding a day-first `dd/mm/yyyy` date to normalize to ISO.
    pub day_first_date: Option<&'static str>,
    /// Clean text columns carrying bracketed reference markers such as `[12]`.
    pub strip_references: &'static [&'static str],
}

impl DatasetDefinition {
    pub fn raw_schema(&self) -> DatasetSchema {
        DatasetSchema::new(self.name, self.raw_columns)
    }

    pub fn clean_schema(&self) -> DatasetSchema {
        let columns: Vec<&str> = self.mappings.iter().map(|(_, clean)| *clean).collect();
        DatasetSchema::new(self.name, &columns)
    }

    pub fn raw_path(&self, raw_dir: &Path) -> PathBuf {
        raw_dir.join(format!("{}.csv", self.name))
    }

    pub fn clean_path(&self, clean_dir: &Path) -> PathBuf {
        clean_dir.join(format!("{}.csv", self.name))
    }

    pub fn raw_artifact(&self) -> String {
        format!("raw/{}", self.name)
    }

    pub fn clean_artifact(&self) -> String {
        format!("clean/{}", self.name)
    }
}

pub const SEOUL_BIKE_SHARING_DATASET: DatasetDefinition = DatasetDefinition {
    name: SEOUL_BIKE_SHARING,
    raw_columns: &[
        "DATE",
        "RENTED_BIKE_COUNT",
        "HOUR",
        "TEMPERATURE",
        "HUMIDITY",
        "WIND_SPEED",
        "VISIBILITY",
        "DEW_POINT_TEMPERATURE",
        "SOLAR_RADIATION",
        "RAINFALL",
        "SNOWFALL",
        "SEASONS",
        "HOLIDAY",
        "FUNCTIONING_DAY",
    ],
    mappings: &[
        ("DATE", seoul::DATE),
        ("RENTED_BIKE_COUNT", seoul::RENTED_BIKE_COUNT),
        ("HOUR", seoul::HOUR),
        ("TEMPERATURE", seoul::TEMPERATURE),
        ("HUMIDITY", seoul::HUMIDITY),
        ("WIND_SPEED", seoul::WIND_SPEED),
        ("VISIBILITY", seoul::VISIBILITY),
        ("DEW_POINT_TEMPERATURE", seoul::DEW_POINT),
        ("SOLAR_RADIATION", seoul::SOLAR_RADIATION),
        ("RAINFALL", seoul::RAINFALL),
        ("SNOWFALL", seoul::SNOWFALL),
        ("SEASONS", seoul::SEASONS),
        ("HOLIDAY", seoul::HOLIDAY),
        ("FUNCTIONING_DAY", seoul::FUNCTIONING_DAY),
    ],
    required: &[seoul::DATE, seoul::RENTED_BIKE_COUNT, seoul::HOUR],
    numeric: &[
        seoul::RENTED_BIKE_COUNT,
        seoul::HOUR,
        seoul::TEMPERATURE,
        seoul::HUMIDITY,
        seoul::WIND_SPEED,
        seoul::VISIBILITY,
        seoul::DEW_POINT,
        seoul::SOLAR_RADIATION,
        seoul::RAINFALL,
        seoul::SNOWFALL,
    ],
    impute_mean: &[
        seoul::TEMPERATURE,
        seoul::HUMIDITY,
        seoul::WIND_SPEED,
        seoul::VISIBILITY,
        seoul::DEW_POINT,
        seoul::SOLAR_RADIATION,
        seoul::RAINFALL,
        seoul::SNOWFALL,
    ],
    day_first_date: Some(seoul::DATE),
    strip_references: &[],
};

pub const WEATHER_FORECAST_DATASET: DatasetDefinition = DatasetDefinition {
    name: WEATHER_FORECAST,
    raw_columns: &[
        "CITY",
        "WEATHER",
        "VISIBILITY",
        "TEMP",
        "TEMP_MIN",
        "TEMP_MAX",
        "PRESSURE",
        "HUMIDITY",
        "WIND_SPEED",
        "WIND_DEG",
        "SEASON",
        "FORECAST_DATETIME",
    ],
    // SEASON is dropped: the transformer derives it from the timestamp.
    mappings: &[
        ("CITY", forecast::CITY),
        ("WEATHER", forecast::WEATHER),
        ("VISIBILITY", forecast::VISIBILITY),
        ("TEMP", forecast::TEMP),
        ("TEMP_MIN", forecast::TEMP_MIN),
        ("TEMP_MAX", forecast::TEMP_MAX),
        ("PRESSURE", forecast::PRESSURE),
        ("HUMIDITY", forecast::HUMIDITY),
        ("WIND_SPEED", forecast::WIND_SPEED),
        ("WIND_DEG", forecast::WIND_DEG),
        ("FORECAST_DATETIME", forecast::FORECAST_DATETIME),
    ],
    required: &[forecast::CITY, forecast::FORECAST_DATETIME],
    numeric: &[
        forecast::VISIBILITY,
        forecast::TEMP,
        forecast::TEMP_MIN,
        forecast::TEMP_MAX,
        forecast::PRESSURE,
        forecast::HUMIDITY,
        forecast::WIND_SPEED,
        forecast::WIND_DEG,
    ],
    impute_mean: &[],
    day_first_date: None,
    strip_references: &[],
};

pub const WORLD_CITIES_DATASET: DatasetDefinition = DatasetDefinition {
    name: WORLD_CITIES,
    raw_columns: &[
        "CITY",
        "CITY_ASCII",
        "LAT",
        "LNG",
        "COUNTRY",
        "ISO2",
        "ISO3",
        "ADMIN_NAME",
        "CAPITAL",
        "POPULATION",
        "ID",
    ],
    mappings: &[
        ("CITY", cities::CITY),
        ("CITY_ASCII", cities::CITY_ASCII),
        ("LAT", cities::LAT),
        ("LNG", cities::LNG),
        ("COUNTRY", cities::COUNTRY),
        ("ISO2", cities::ISO2),
        ("ISO3", cities::ISO3),
        ("POPULATION", cities::POPULATION),
    ],
    required: &[cities::CITY, cities::LAT, cities::LNG],
    numeric: &[cities::LAT, cities::LNG, cities::POPULATION],
    impute_mean: &[],
    day_first_date: None,
    strip_references: &[],
};

pub const BIKE_SHARING_SYSTEMS_DATASET: DatasetDefinition = DatasetDefinition {
    name: BIKE_SHARING_SYSTEMS,
    raw_columns: &["COUNTRY", "CITY", "SYSTEM", "BICYCLES"],
    mappings: &[
        ("COUNTRY", systems::COUNTRY),
        ("CITY", systems::CITY),
        ("SYSTEM", systems::SYSTEM),
        ("BICYCLES", systems::BICYCLES),
    ],
    required: &[systems::CITY],
    numeric: &[systems::BICYCLES],
    impute_mean: &[],
    day_first_date: None,
    strip_references: &[systems::COUNTRY, systems::CITY, systems::SYSTEM],
};

/// All datasets, in collection order.
pub fn datasets() -> Vec<DatasetDefinition> {
    vec![
        BIKE_SHARING_SYSTEMS_DATASET,
        WEATHER_FORECAST_DATASET,
        WORLD_CITIES_DATASET,
        SEOUL_BIKE_SHARING_DATASET,
    ]
}

pub fn find(name: &str) -> Option<DatasetDefinition> {
    datasets().into_iter().find(|d| d.name == name)
}
