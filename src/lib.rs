//! Bike Demand Forecaster
//!
//! A staged data pipeline (collect, wrangle, analyze, visualize, model) and a
//! prediction service that turns live weather forecasts into per-city peak
//! bike-rental demand.

pub mod api;
pub mod app_state;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod features;
pub mod ml;
pub mod pipeline;
pub mod serving;
pub mod storage;
pub mod telemetry;
