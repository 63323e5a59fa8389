//! Shared fixtures: a data directory laid out the way the pipeline and the
//! server expect it.

#![allow(dead_code)]

use bike_demand_forecaster::config::Config;
use std::fmt::Write as _;
use std::path::Path;

pub const FORECAST_HEADER: &str =
    "CITY,WEATHER,VISIBILITY,TEMP,TEMP_MIN,TEMP_MAX,PRESSURE,HUMIDITY,WIND_SPEED,WIND_DEG,SEASON,FORECAST_DATETIME";

/// Config with every path under `root` and noise-free fallback estimates.
pub fn config_in(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.raw_dir = root.join("raw");
    cfg.paths.clean_dir = root.join("clean");
    cfg.paths.models_dir = root.join("models");
    cfg.paths.reports_dir = root.join("reports");
    cfg.paths.logs_dir = root.join("logs");
    cfg.serving.model_artifact = root.join("models/best_model.bin");
    cfg.serving.forecast_dataset = root.join("clean/weather_forecast.csv");
    cfg.serving.reference_dataset = root.join("clean/world_cities.csv");
    cfg.serving.fallback.noise_std = 0.0;
    cfg.pipeline.training.max_iterations = 300;
    cfg.pipeline.training.search_workers = 2;
    for dir in [&cfg.paths.raw_dir, &cfg.paths.clean_dir, &cfg.paths.models_dir, &cfg.paths.reports_dir] {
        std::fs::create_dir_all(dir).unwrap();
    }
    cfg
}

/// Two summer days of hourly history, demand peaking in the evening.
pub fn seoul_raw_csv() -> String {
    let mut out = String::from(
        "DATE,RENTED_BIKE_COUNT,HOUR,TEMPERATURE,HUMIDITY,WIND_SPEED,VISIBILITY,DEW_POINT_TEMPERATURE,\
         SOLAR_RADIATION,RAINFALL,SNOWFALL,SEASONS,HOLIDAY,FUNCTIONING_DAY\n",
    );
    for (day, offset) in [("01/06/2018", 0.0), ("02/06/2018", 1.5)] {
        for hour in 0..24u32 {
            let temperature = 18.0 + offset + (hour as f64 - 4.0).max(0.0) * 0.6;
            let demand = 150.0 + hour as f64 * 40.0 + if (17..=19).contains(&hour) { 600.0 } else { 0.0 };
            writeln!(
                out,
                "{day},{demand},{hour},{temperature:.1},55,1.8,1800,12.0,0.5,0,0,Summer,No Holiday,Yes"
            )
            .unwrap();
        }
    }
    out
}

pub fn forecast_raw_csv(rows: &[(&str, f64, &str)]) -> String {
    let mut out = format!("{FORECAST_HEADER}\n");
    for (city, temp, datetime) in rows {
        writeln!(out, "{city},Clear,10000,{temp},{temp},{temp},1012,60,2.0,180,Summer,{datetime}").unwrap();
    }
    out
}

pub const WORLD_CITIES_RAW: &str = "\
CITY,CITY_ASCII,LAT,LNG,COUNTRY,ISO2,ISO3,ADMIN_NAME,CAPITAL,POPULATION,ID
Seoul,Seoul,37.5600,126.9900,\"Korea, South\",KR,KOR,Seoul,primary,21794000,1410836482
New York,New York,40.6943,-73.9249,United States,US,USA,New York,,18832416,1840034016
Paris,Paris,48.8566,2.3522,France,FR,FRA,Ile-de-France,primary,11060000,1250015082
";

pub const SYSTEMS_RAW: &str = "\
COUNTRY,CITY,SYSTEM,BICYCLES
South Korea,Seoul[4],Ttareungyi,20000
France,Paris,Velib' Metropole[12],\"19,000\"
";

pub fn write_raw_inputs(cfg: &Config, forecast: &str) {
    let raw = &cfg.paths.raw_dir;
    std::fs::write(raw.join("seoul_bike_sharing.csv"), seoul_raw_csv()).unwrap();
    std::fs::write(raw.join("weather_forecast.csv"), forecast).unwrap();
    std::fs::write(raw.join("world_cities.csv"), WORLD_CITIES_RAW).unwrap();
    std::fs::write(raw.join("bike_sharing_systems.csv"), SYSTEMS_RAW).unwrap();
}

/// Writes already-clean serving inputs, skipping the pipeline.
pub fn write_clean_serving_inputs(cfg: &Config, forecast_rows: &[(&str, f64, &str)]) {
    let mut forecast = String::from(
        "city,weather,visibility,temp,temp_min,temp_max,pressure,humidity,wind_speed,wind_deg,forecast_datetime\n",
    );
    for (city, temp, datetime) in forecast_rows {
        writeln!(forecast, "{city},Clear,10000,{temp},{temp},{temp},1012,60,2.0,180,{datetime}").unwrap();
    }
    std::fs::write(&cfg.serving.forecast_dataset, forecast).unwrap();
    std::fs::write(
        &cfg.serving.reference_dataset,
        "city,city_ascii,lat,lng,country,iso2,iso3,population\n\
         Seoul,Seoul,37.56,126.99,\"Korea, South\",KR,KOR,21794000\n\
         New York,New York,40.6943,-73.9249,United States,US,USA,18832416\n",
    )
    .unwrap();
}
