// src/checkpoint/mod.rs
//! Append-only checkpoint ledger with gap-free ids.

pub mod record;
pub mod redis_store;
pub mod sequencer;
pub mod store;

pub use record::{CheckpointRecord, PeriodDelta};
pub use redis_store::RedisCheckpointStore;
pub use sequencer::CheckpointSequencer;
pub use store::{CheckpointStore, InMemoryCheckpointStore, PutOutcome};
