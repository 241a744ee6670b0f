// Tracing setup shared by every `perch` subcommand

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "perch=debug,tower_http=debug"
    } else {
        "perch=info"
    }
}

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over
/// `verbose`. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_filter_enables_debug() {
        assert!(default_filter(true).contains("perch=debug"));
        assert_eq!(default_filter(false), "perch=info");
    }

    #[test]
    fn test_init_twice() {
        init_tracing(false);
        init_tracing(true);
    }
}
