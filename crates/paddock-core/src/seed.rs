// Driver seed data loading.
//
// Reads a drivers CSV with columns: id, number, name, constructor,
// season_points. `number` may be blank for reserve drivers.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::draft::pick::Driver;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
struct RawDriver {
    id: i64,
    #[serde(default)]
    number: Option<u32>,
    name: String,
    constructor: String,
    #[serde(default)]
    season_points: f64,
}

fn load_drivers_from_reader<R: Read>(rdr: R) -> Result<Vec<Driver>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut drivers = Vec::new();
    for result in reader.deserialize::<RawDriver>() {
        match result {
            Ok(raw) => {
                if !raw.season_points.is_finite() {
                    warn!("skipping driver '{}': non-finite season_points", raw.name.trim());
                    continue;
                }
                drivers.push(Driver {
                    id: raw.id,
                    number: raw.number,
                    name: raw.name.trim().to_string(),
                    constructor: raw.constructor.trim().to_string(),
                    season_points: raw.season_points,
                });
            }
            Err(e) => warn!("skipping malformed driver row: {}", e),
        }
    }
    Ok(drivers)
}

/// Load drivers from a CSV file. Duplicate ids and an empty file are errors.
pub fn load_drivers(path: &Path) -> Result<Vec<Driver>, SeedError> {
    let path_label = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| SeedError::Io {
        path: path_label.clone(),
        source: e,
    })?;
    let drivers = load_drivers_from_reader(file).map_err(|e| SeedError::Csv {
        path: path_label.clone(),
        source: e,
    })?;
    validate(&drivers)?;
    info!("Loaded {} drivers from {}", drivers.len(), path_label);
    Ok(drivers)
}

fn validate(drivers: &[Driver]) -> Result<(), SeedError> {
    if drivers.is_empty() {
        return Err(SeedError::Validation("no drivers in seed file".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for d in drivers {
        if !seen.insert(d.id) {
            return Err(SeedError::Validation(format!("driver id {} repeated", d.id)));
        }
    }
    Ok(())
}
