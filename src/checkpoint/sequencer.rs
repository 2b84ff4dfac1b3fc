// src/checkpoint/sequencer.rs
//! Gap-free checkpoint id allocation on top of a create-if-absent store.
//!
//! The counter stored next to the records is only a hint. A record id is
//! owned by whoever wins the conditional write for it; losing writers re-read
//! the hint and move past the id they lost.

use super::record::{CheckpointRecord, PeriodDelta};
use super::store::{CheckpointStore, PutOutcome};
use crate::error::{ArbiterError, Result};
use log::{debug, info, warn};
use std::sync::Arc;

pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 16;

pub struct CheckpointSequencer {
    store: Arc<dyn CheckpointStore>,
    max_conflict_attempts: u32,
}

impl CheckpointSequencer {
    pub fn new(store: Arc<dyn CheckpointStore>, max_conflict_attempts: u32) -> Self {
        Self {
            store,
            max_conflict_attempts: max_conflict_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Highest committed id according to the counter hint. 0 when the
    /// counter was never written or cannot be read.
    pub async fn get_latest(&self) -> u64 {
        match self.store.get_counter().await {
            Ok(value) => value.unwrap_or(0),
            Err(e) => {
                warn!("Could not read checkpoint counter from {}: {}; assuming 0", self.store.name(), e);
                0
            }
        }
    }

    /// Commits `delta` as the next record and returns it.
    ///
    /// Store errors propagate unchanged so the caller can apply its own retry
    /// budget. Losing the conditional write `max_conflict_attempts` times in a
    /// row yields `ConditionalWriteConflict`; nothing is written in that case.
    pub async fn allocate_and_commit(&self, delta: &PeriodDelta) -> Result<CheckpointRecord> {
        let mut candidate = self.get_latest().await + 1;

        for attempt in 1..=self.max_conflict_attempts {
            let previous = self.record_before(candidate).await?;
            let record = CheckpointRecord::follow(&previous, candidate, delta);

            match self.store.put_if_absent(&record).await? {
                PutOutcome::Created => {
                    self.advance_counter(candidate).await;
                    info!(
                        "💾 Checkpoint {} committed: {} unit(s), cost {} (cumulative {} unit(s), {})",
                        record.id,
                        record.units_completed,
                        record.period_cost,
                        record.cumulative_units,
                        record.cumulative_cost
                    );
                    return Ok(record);
                }
                PutOutcome::AlreadyExists => {
                    let reread = self.get_latest().await;
                    let next = reread.max(candidate) + 1;
                    warn!(
                        "Checkpoint id {} already taken (attempt {}/{}); retrying with {}",
                        candidate, attempt, self.max_conflict_attempts, next
                    );
                    candidate = next;
                }
            }
        }

        Err(ArbiterError::ConditionalWriteConflict { id: candidate })
    }

    /// Latest committed record, or the baseline when the ledger is empty.
    /// Walks forward past a lagging counter hint.
    pub async fn resume_point(&self, start_unit_id: u64) -> Result<CheckpointRecord> {
        let hint = self.get_latest().await;
        let mut latest = if hint == 0 {
            self.store
                .get(0)
                .await?
                .unwrap_or_else(|| CheckpointRecord::baseline(start_unit_id))
        } else {
            self.store.get(hint).await?.ok_or_else(|| {
                ArbiterError::NonRecoverable(format!(
                    "counter points at checkpoint {} but no such record exists",
                    hint
                ))
            })?
        };

        while let Some(next) = self.store.get(latest.id + 1).await? {
            debug!("Counter hint lags: found checkpoint {}", next.id);
            latest = next;
        }
        Ok(latest)
    }

    async fn record_before(&self, id: u64) -> Result<CheckpointRecord> {
        let previous_id = id - 1;
        match self.store.get(previous_id).await? {
            Some(record) => Ok(record),
            None if previous_id == 0 => Ok(CheckpointRecord::baseline(0)),
            None => Err(ArbiterError::NonRecoverable(format!(
                "checkpoint {} is missing; cannot derive totals for {}",
                previous_id, id
            ))),
        }
    }

    /// Best effort: the counter only ever moves forward, and failing to
    /// move it costs the next writer a conflict, not a record.
    async fn advance_counter(&self, id: u64) {
        let current = self.get_latest().await;
        if current >= id {
            return;
        }
        if let Err(e) = self.store.put_counter(id).await {
            warn!("Failed to advance checkpoint counter to {}: {}", id, e);
        }
    }
}
