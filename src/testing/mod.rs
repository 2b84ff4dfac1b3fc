//! In-process fakes for the four collaborator seams, shared by unit and
//! integration tests.

pub mod mocks;

pub use mocks::{
    random_walk_series, ConflictingCheckpointStore, FlakyCheckpointStore, ScriptedController,
    ScriptedTaskExecutor, StaticPriceSource,
};
