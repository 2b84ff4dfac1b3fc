// src/pricing/csv_source.rs
//! Price histories exported to disk, one `<provider>.csv` per provider with
//! `timestamp,price` columns (RFC 3339 timestamps).

use super::source::PriceSource;
use super::types::{PriceObservation, PriceSeries, ProviderId};
use crate::error::{ArbiterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PriceRow {
    timestamp: DateTime<Utc>,
    price: f64,
}

#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    dir: PathBuf,
}

impl CsvPriceSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, provider: &ProviderId) -> PathBuf {
        self.dir.join(format!("{}.csv", provider))
    }

    fn read_series(&self, provider: &ProviderId, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<PriceSeries> {
        let path = self.path_for(provider);
        if !path.exists() {
            warn!("No price history file for {} at {:?}", provider, path);
            return Ok(PriceSeries::empty(provider.clone()));
        }

        let mut rdr = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let mut observations = Vec::new();
        for (line, row) in rdr.deserialize::<PriceRow>().enumerate() {
            let row = row.map_err(|e| {
                ArbiterError::Parse(format!("{:?} record {}: {}", path, line + 1, e))
            })?;
            if row.timestamp < start || row.timestamp > end {
                continue;
            }
            observations.push(PriceObservation::new(provider.clone(), row.price, row.timestamp)?);
        }
        info!("Loaded {} price points for {} from {:?}", observations.len(), provider, path);
        PriceSeries::new(provider.clone(), observations)
    }
}

#[async_trait]
impl PriceSource for CsvPriceSource {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch(
        &self,
        provider: &ProviderId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _region: Option<&str>,
    ) -> Result<PriceSeries> {
        self.read_series(provider, start, end)
    }
}
