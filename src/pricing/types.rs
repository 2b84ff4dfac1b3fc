// src/pricing/types.rs
use crate::error::{ArbiterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one provider/instance-type pair, e.g. `m6i.2xlarge`
/// or `Standard_D32pls_v5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single published spot price. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    provider: ProviderId,
    price: f64,
    timestamp: DateTime<Utc>,
}

impl PriceObservation {
    /// Rejects negative and non-finite prices.
    pub fn new(provider: impl Into<ProviderId>, price: f64, timestamp: DateTime<Utc>) -> Result<Self> {
        if !price.is_finite() || price < 0.0 {
            return Err(ArbiterError::InvalidInput(format!(
                "price must be a finite value >= 0, got {}",
                price
            )));
        }
        Ok(Self {
            provider: provider.into(),
            price,
            timestamp,
        })
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for PriceObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} = {}",
            self.provider,
            self.timestamp.to_rfc3339(),
            self.price
        )
    }
}

/// Observations for exactly one provider, non-decreasing in timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    provider: ProviderId,
    observations: Vec<PriceObservation>,
}

impl PriceSeries {
    /// Builds a series, stably sorting by timestamp. Vendor APIs often
    /// return history newest-first; equal timestamps keep their input order.
    pub fn new(provider: impl Into<ProviderId>, mut observations: Vec<PriceObservation>) -> Result<Self> {
        let provider = provider.into();
        if let Some(stray) = observations.iter().find(|o| o.provider() != &provider) {
            return Err(ArbiterError::InvalidInput(format!(
                "series for {} contains an observation for {}",
                provider,
                stray.provider()
            )));
        }
        observations.sort_by_key(|o| o.timestamp());
        Ok(Self {
            provider,
            observations,
        })
    }

    pub fn empty(provider: impl Into<ProviderId>) -> Self {
        Self {
            provider: provider.into(),
            observations: Vec::new(),
        }
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceObservation> {
        self.observations.last()
    }

    /// Drops observations at or before `cutoff`.
    pub fn retain_after(&mut self, cutoff: DateTime<Utc>) {
        self.observations.retain(|o| o.timestamp() > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_rejects_negative_and_nan_prices() {
        assert!(PriceObservation::new("a", -0.01, ts(0)).is_err());
        assert!(PriceObservation::new("a", f64::NAN, ts(0)).is_err());
        assert!(PriceObservation::new("a", f64::INFINITY, ts(0)).is_err());
        assert!(PriceObservation::new("a", 0.0, ts(0)).is_ok());
    }

    #[test]
    fn test_series_sorts_newest_first_input_stably() {
        let obs = vec![
            PriceObservation::new("a", 3.0, ts(30)).unwrap(),
            PriceObservation::new("a", 2.0, ts(10)).unwrap(),
            PriceObservation::new("a", 2.5, ts(10)).unwrap(),
            PriceObservation::new("a", 1.0, ts(0)).unwrap(),
        ];
        let series = PriceSeries::new("a", obs).unwrap();
        let prices: Vec<f64> = series.observations().iter().map(|o| o.price()).collect();
        assert_eq!(prices, vec![1.0, 2.0, 2.5, 3.0]);
        assert_eq!(series.latest().unwrap().price(), 3.0);
    }

    #[test]
    fn test_series_rejects_foreign_provider() {
        let obs = vec![PriceObservation::new("b", 1.0, ts(0)).unwrap()];
        assert!(PriceSeries::new("a", obs).is_err());
    }

    #[test]
    fn test_retain_after() {
        let obs = (0..5)
            .map(|i| PriceObservation::new("a", i as f64, ts(i)).unwrap())
            .collect();
        let mut series = PriceSeries::new("a", obs).unwrap();
        series.retain_after(ts(2));
        assert_eq!(series.len(), 2);
        assert_eq!(series.observations()[0].timestamp(), ts(3));
    }
}
