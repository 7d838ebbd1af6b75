//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Maps a repeat count of `-v` to the level used for the compositor's own targets.
pub fn verbosity_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Builds the fallback filter used when `RUST_LOG` is not set.
pub fn default_directives(verbosity: u8) -> String {
    let level = verbosity_level(verbosity);
    format!(
        "info,compositor_renderer={level},compositor_rhi={level},compositor_app={level},ar_compositor={level},winit=warn"
    )
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity`.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0), "info");
        assert_eq!(verbosity_level(1), "debug");
        assert_eq!(verbosity_level(2), "trace");
        assert_eq!(verbosity_level(9), "trace");
    }

    #[test]
    fn test_default_directives_parse() {
        for verbosity in 0..3 {
            let directives = default_directives(verbosity);
            assert!(directives.contains("winit=warn"));
            assert!(EnvFilter::try_new(&directives).is_ok());
        }
    }
}
