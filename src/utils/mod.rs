// src/utils/mod.rs
use log::info;

pub mod clock;
pub mod poll;
pub mod timing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use poll::{poll_until, PollOutcome};
pub use timing::Timer;

/// Installs the global fern logger. `level` falls back to `info` when unset
/// or unparsable.
pub fn setup_logging(level: Option<&str>) -> Result<(), fern::InitError> {
    let level = level
        .and_then(|l| l.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("redis", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized at {}.", level);
    Ok(())
}
