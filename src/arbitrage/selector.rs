// src/arbitrage/selector.rs
//! Greedy lowest-current-price selection over a merged price timeline.
//!
//! Ties on the lowest price go to the provider declared first. A provider
//! whose price has never been observed is never selected.

use super::statistics::RunSummary;
use crate::error::{ArbiterError, Result};
use crate::pricing::{PriceObservation, ProviderId};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Selection emitted after each observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub active_provider: ProviderId,
    pub selected_price: f64,
    /// Last known price per provider, in the selector's priority order.
    /// `None` until the provider has reported.
    pub prices: Vec<Option<f64>>,
}

/// Mutable comparison state, owned by one selector for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrageState {
    /// Indexed like the selector's providers. `f64::INFINITY` means unknown.
    pub last_price: Vec<f64>,
    pub active_provider: Option<usize>,
    pub switch_count: u64,
    pub switch_timestamps: Vec<DateTime<Utc>>,
}

impl ArbitrageState {
    fn new(provider_count: usize) -> Self {
        Self {
            last_price: vec![f64::INFINITY; provider_count],
            active_provider: None,
            switch_count: 0,
            switch_timestamps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArbitrageSelector {
    providers: Vec<ProviderId>,
    index: HashMap<ProviderId, usize>,
    state: ArbitrageState,
}

impl ArbitrageSelector {
    /// `providers` is the priority order used for tie-breaks.
    pub fn new(providers: Vec<ProviderId>) -> Result<Self> {
        if providers.is_empty() {
            return Err(ArbiterError::InvalidInput(
                "at least one provider is required".to_string(),
            ));
        }
        let mut index = HashMap::with_capacity(providers.len());
        for (i, provider) in providers.iter().enumerate() {
            if index.insert(provider.clone(), i).is_some() {
                return Err(ArbiterError::InvalidInput(format!(
                    "provider {} declared twice",
                    provider
                )));
            }
        }
        let state = ArbitrageState::new(providers.len());
        Ok(Self {
            providers,
            index,
            state,
        })
    }

    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }

    pub fn state(&self) -> &ArbitrageState {
        &self.state
    }

    pub fn switch_count(&self) -> u64 {
        self.state.switch_count
    }

    pub fn switch_timestamps(&self) -> &[DateTime<Utc>] {
        &self.state.switch_timestamps
    }

    pub fn active_provider(&self) -> Option<&ProviderId> {
        self.state.active_provider.map(|i| &self.providers[i])
    }

    /// Last known price of `provider`, if it has reported.
    pub fn price_of(&self, provider: &ProviderId) -> Option<f64> {
        let i = *self.index.get(provider)?;
        let price = self.state.last_price[i];
        price.is_finite().then_some(price)
    }

    /// Feeds one observation. Returns `None` only for providers this
    /// selector was not configured with.
    pub fn observe(&mut self, observation: &PriceObservation) -> Option<Decision> {
        let Some(&slot) = self.index.get(observation.provider()) else {
            warn!(
                "Ignoring observation for undeclared provider {}",
                observation.provider()
            );
            return None;
        };
        self.state.last_price[slot] = observation.price();

        // The provider just observed has a finite price, so argmin exists.
        let selected = self.cheapest()?;

        if let Some(current) = self.state.active_provider {
            if current != selected {
                self.state.switch_count += 1;
                self.state.switch_timestamps.push(observation.timestamp());
                debug!(
                    "Switch #{} at {}: {} -> {}",
                    self.state.switch_count,
                    observation.timestamp(),
                    self.providers[current],
                    self.providers[selected]
                );
            }
        }
        self.state.active_provider = Some(selected);

        Some(Decision {
            timestamp: observation.timestamp(),
            active_provider: self.providers[selected].clone(),
            selected_price: self.state.last_price[selected],
            prices: self
                .state
                .last_price
                .iter()
                .map(|p| p.is_finite().then_some(*p))
                .collect(),
        })
    }

    /// Batch mode: consumes a whole timeline and returns every decision.
    pub fn run<'a, I>(&mut self, timeline: I) -> Vec<Decision>
    where
        I: IntoIterator<Item = &'a PriceObservation>,
    {
        timeline
            .into_iter()
            .filter_map(|observation| self.observe(observation))
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            providers: self.providers.clone(),
            switch_count: self.state.switch_count,
            switch_timestamps: self.state.switch_timestamps.clone(),
        }
    }

    /// Index of the cheapest known provider, earliest declared on ties.
    fn cheapest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, price) in self.state.last_price.iter().enumerate() {
            if !price.is_finite() {
                continue;
            }
            match best {
                Some(b) if self.state.last_price[b] <= *price => {}
                _ => best = Some(i),
            }
        }
        best
    }
}
