use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::dataset::catalog::{cities, WORLD_CITIES_DATASET};
use crate::dataset::{DatasetError, Table};

/// One row of the geographic reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityReference {
    pub city: String,
    pub city_ascii: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: Option<f64>,
}

/// Case-insensitive lookup over `city` and `city_ascii`. The first row wins
/// when a name repeats; the reference file lists larger cities first.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    rows: Vec<CityReference>,
    index: HashMap<String, usize>,
}

impl ReferenceTable {
    pub fn new(rows: Vec<CityReference>) -> Self {
        let mut index = HashMap::with_capacity(rows.len() * 2);
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.city.to_lowercase()).or_insert(i);
            index.entry(row.city_ascii.to_lowercase()).or_insert(i);
        }
        Self { rows, index }
    }

    /// Builds from a clean `world_cities` table; rows without coordinates
    /// are skipped.
    pub fn from_table(table: &Table) -> Result<Self, DatasetError> {
        table.validate(&WORLD_CITIES_DATASET.clean_schema())?;
        let rows = table
            .records()
            .filter_map(|r| {
                let city = r.get(cities::CITY)?.to_string();
                Some(CityReference {
                    city_ascii: r.get(cities::CITY_ASCII).map(str::to_string).unwrap_or_else(|| city.clone()),
                    country: r.get(cities::COUNTRY).unwrap_or_default().to_string(),
                    latitude: r.get_f64(cities::LAT)?,
                    longitude: r.get_f64(cities::LNG)?,
                    population: r.get_f64(cities::POPULATION),
                    city,
                })
            })
            .collect();
        Ok(Self::new(rows))
    }

    /// Row index `name` resolves to. Two names share an index exactly when
    /// they denote the same reference city.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.trim().to_lowercase()).copied()
    }

    pub fn row(&self, index: usize) -> Option<&CityReference> {
        self.rows.get(index)
    }

    pub fn lookup(&self, name: &str) -> Option<&CityReference> {
        self.position(name).and_then(|i| self.row(i))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Forecast-source entity names mapped to reference-dataset names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAliasTable {
    aliases: BTreeMap<String, String>,
}

impl EntityAliasTable {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    /// The mapped name, or `name` itself when it has no alias.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }
}

impl From<&BTreeMap<String, String>> for EntityAliasTable {
    fn from(aliases: &BTreeMap<String, String>) -> Self {
        Self::new(aliases.clone())
    }
}
