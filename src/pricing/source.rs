// src/pricing/source.rs
//! The price-history seam. One implementation per provider SDK lives outside
//! this crate; the core only ever sees typed `PriceSeries`.

use super::types::{PriceSeries, ProviderId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{debug, warn};

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Returns the name of the source (e.g., "ec2", "azure-retail", "csv").
    fn name(&self) -> &str;

    /// Price history for one provider over `[start, end]`. May be empty.
    async fn fetch(
        &self,
        provider: &ProviderId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        region: Option<&str>,
    ) -> Result<PriceSeries>;
}

/// Fetches every provider's history concurrently, returned in the order of
/// `providers`. Observations a source leaks outside the window are dropped.
pub async fn fetch_all(
    source: &dyn PriceSource,
    providers: &[ProviderId],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    region: Option<&str>,
) -> Result<Vec<PriceSeries>> {
    let fetches = providers
        .iter()
        .map(|provider| source.fetch(provider, start, end, region));
    let fetched = try_join_all(fetches).await?;

    let mut clamped = Vec::with_capacity(fetched.len());
    for (provider, series) in providers.iter().zip(fetched) {
        let total = series.len();
        let inside: Vec<_> = series
            .observations()
            .iter()
            .filter(|o| o.timestamp() >= start && o.timestamp() <= end)
            .cloned()
            .collect();
        if inside.len() != total {
            warn!(
                "{} returned {} observations outside [{}, {}] for {}; dropping them",
                source.name(),
                total - inside.len(),
                start,
                end,
                provider
            );
        }
        debug!("{}: {} observations for {}", source.name(), inside.len(), provider);
        clamped.push(PriceSeries::new(provider.clone(), inside)?);
    }
    Ok(clamped)
}
