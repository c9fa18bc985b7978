//! Log output for the `buildrelay` binary.
//!
//! Everything is written to stderr, either as human-readable lines or as one
//! JSON object per event. `RUST_LOG` wins over the level chosen on the
//! command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives for a run: `RUST_LOG` when it is set and non-blank,
/// otherwise the bare `fallback` level.
fn filter_directives(from_env: Option<String>, fallback: Level) -> String {
    from_env
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or_else(|| fallback.as_str().to_lowercase())
}

/// Install the process-wide subscriber. A second call is a no-op.
pub fn init_tracing(json: bool, level: Level) {
    let directives = filter_directives(std::env::var("RUST_LOG").ok(), level);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json_lines = json.then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let text_lines = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_lines)
        .with(text_lines)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_directives_take_precedence() {
        assert_eq!(
            filter_directives(Some("buildrelay_jenkins=trace".into()), Level::WARN),
            "buildrelay_jenkins=trace"
        );
    }

    #[test]
    fn test_blank_env_falls_back_to_level() {
        assert_eq!(filter_directives(Some("  ".into()), Level::DEBUG), "debug");
        assert_eq!(filter_directives(None, Level::INFO), "info");
    }
}
