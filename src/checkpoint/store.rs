// src/checkpoint/store.rs
//! The durable side of the checkpoint ledger.

use super::record::CheckpointRecord;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

/// Keyed record storage with a create-if-absent write and an unconditional
/// sequence-counter hint. The conditional write is the only concurrency
/// control the sequencer relies on.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, id: u64) -> Result<Option<CheckpointRecord>>;

    /// Writes `record` under its id unless that id is already taken.
    async fn put_if_absent(&self, record: &CheckpointRecord) -> Result<PutOutcome>;

    async fn get_counter(&self) -> Result<Option<u64>>;

    /// Unconditional overwrite of the counter hint.
    async fn put_counter(&self, id: u64) -> Result<()>;
}

/// Process-local store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    records: DashMap<u64, CheckpointRecord>,
    counter: Mutex<Option<u64>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every committed record, ordered by id.
    pub fn records(&self) -> Vec<CheckpointRecord> {
        let mut all: Vec<CheckpointRecord> = self.records.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, id: u64) -> Result<Option<CheckpointRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn put_if_absent(&self, record: &CheckpointRecord) -> Result<PutOutcome> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => {
                debug!("memory store: id {} already taken", record.id);
                Ok(PutOutcome::AlreadyExists)
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(PutOutcome::Created)
            }
        }
    }

    async fn get_counter(&self) -> Result<Option<u64>> {
        Ok(*self.counter.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn put_counter(&self, id: u64) -> Result<()> {
        *self.counter.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);
        Ok(())
    }
}
