//! Tracing setup for the updater binaries.
//!
//! The log is the live view of a run. Text output is one timestamped line per
//! event. Child process output is relayed under [`OUTPUT_TARGET`], so
//! `RUST_LOG=info,odin_updater::output=off` keeps the run's own progress
//! lines and hides the build chatter.

use crate::runner::OUTPUT_TARGET;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Filter used when `RUST_LOG` is not set.
///
/// Relayed output follows `level` like everything else; git query output is
/// relayed at `debug` and only shows up with `--verbose`.
fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::new(format!("{level},{OUTPUT_TARGET}={level}"))
}

/// Install the global subscriber.
///
/// `json` switches to newline-delimited JSON, which keeps event targets so
/// relayed output can be told apart from progress lines. Later calls are
/// ignored; the global subscriber can only be set once.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string())),
            )
            .try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_names_output_target() {
        let filter = default_filter(Level::DEBUG).to_string().to_lowercase();
        assert!(filter.contains("odin_updater::output=debug"));
    }

    #[test]
    fn test_output_can_be_silenced_by_target() {
        assert!(EnvFilter::try_new(format!("info,{OUTPUT_TARGET}=off")).is_ok());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
