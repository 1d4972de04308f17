//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives used when neither `RUST_LOG` nor the config supplies a filter.
const DEFAULT_DIRECTIVES: &str = "info,frameloop=debug,frameloop_renderer=debug,frameloop_rhi=info";

/// Initialize the global tracing subscriber.
///
/// Filter precedence is `RUST_LOG`, then `directives` (usually
/// `log.filter` from the config file), then a built-in default.
/// Calling this more than once is harmless; later calls are ignored.
///
/// # Example
/// ```
/// frameloop_core::init_logging(None);
/// tracing::info!("frameloop starting");
/// ```
pub fn init_logging(directives: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        directives
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
    });

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging(Some("warn"));
        init_logging(None);
    }
}
