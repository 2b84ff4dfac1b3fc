//! Price observations, per-provider series and the sources that produce them.

pub mod csv_source;
pub mod source;
pub mod types;

pub use csv_source::CsvPriceSource;
pub use source::PriceSource;
pub use types::{PriceObservation, PriceSeries, ProviderId};
