//! Checkpointed simulation: the control loop and the work it drives.

pub mod config;
pub mod engine;
pub mod http_task;
pub mod task;

pub use config::SimulationConfig;
pub use engine::{LoopState, SimulationLoop, SimulationReport};
pub use http_task::HttpTaskExecutor;
pub use task::{FailureKind, TaskExecutor, TaskOutcome};
