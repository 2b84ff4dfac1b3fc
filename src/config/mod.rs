pub mod settings;

pub use settings::Config;

use crate::error::Result;
use std::sync::Arc;

/// Loads `.env` if present, reads the environment and validates it.
/// Fails before any loop starts when required settings are absent. The
/// caller logs the result once its logger is installed.
pub fn load_config() -> Result<Arc<Config>> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.validate()?;

    Ok(Arc::new(config))
}
