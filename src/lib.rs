pub mod arbitrage;
pub mod checkpoint;
pub mod compute;
pub mod config;
pub mod error;
pub mod pricing;
pub mod simulation;
pub mod testing; // In-process fakes for the collaborator seams
pub mod utils;

pub use arbitrage::{ArbitrageSelector, Decision, SpotPriceAnalyzer};
pub use checkpoint::{CheckpointRecord, CheckpointSequencer, CheckpointStore};
pub use compute::{ComputeController, ProviderState};
pub use error::{ArbiterError, Result};
pub use pricing::{PriceObservation, PriceSeries, PriceSource, ProviderId};
pub use simulation::{SimulationLoop, SimulationReport, TaskExecutor, TaskOutcome};
