//! Temperature-driven demand estimate used whenever the model path fails.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::{DataSource, GeoPrediction, PredictionSource};
use crate::config::FallbackConfig;

/// `max(0, base + slope * temperature + noise)`.
///
/// Holds no generator of its own; each prediction pass draws from an
/// [`FallbackEstimator::rng`] it owns, so concurrent passes never contend.
#[derive(Debug, Clone)]
pub struct FallbackEstimator {
    base: f64,
    slope: f64,
    noise: Option<Normal<f64>>,
    seed: Option<u64>,
}

impl FallbackEstimator {
    pub fn new(config: &FallbackConfig) -> Self {
        // A zero standard deviation disables noise entirely.
        let noise = (config.noise_std > 0.0)
            .then(|| Normal::new(0.0, config.noise_std).ok())
            .flatten();
        Self {
            base: config.base,
            slope: config.slope,
            noise,
            seed: config.seed,
        }
    }

    /// Generator for one prediction pass. A configured seed restarts the
    /// same noise sequence on every pass.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn estimate<R: Rng + ?Sized>(&self, temperature: f64, rng: &mut R) -> f64 {
        let noise = self.noise.as_ref().map_or(0.0, |n| n.sample(rng));
        (self.base + self.slope * temperature + noise).max(0.0)
    }

    fn noiseless(&self, temperature: f64) -> f64 {
        (self.base + self.slope * temperature).max(0.0)
    }

    /// Fixed set of well-known systems, estimated without noise.
    ///
    /// Served when nothing live could be joined, so callers always get a
    /// non-empty result tagged as sample data.
    pub fn sample(&self) -> Vec<GeoPrediction> {
        SAMPLE_CITIES
            .iter()
            .map(|(entity, country, latitude, longitude, temperature)| GeoPrediction {
                entity: entity.to_string(),
                peak_demand: self.noiseless(*temperature).round() as u64,
                latitude: *latitude,
                longitude: *longitude,
                country: country.to_string(),
                prediction_source: PredictionSource::Fallback,
                data_source: DataSource::Sample,
            })
            .collect()
    }
}

/// (city, country, latitude, longitude, typical daytime temperature)
const SAMPLE_CITIES: &[(&str, &str, f64, f64, f64)] = &[
    ("Seoul", "Korea, South", 37.5600, 126.9900, 18.0),
    ("New York", "United States", 40.6943, -73.9249, 16.0),
    ("London", "United Kingdom", 51.5072, -0.1275, 14.0),
    ("Paris", "France", 48.8566, 2.3522, 15.0),
    ("Suzhou", "China", 31.3040, 120.6164, 20.0),
];
