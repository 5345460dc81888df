use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global fmt subscriber once.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (or `info`) applies.
/// Quiet mode silences everything, for hosts that own stdout.
pub fn init_tracing(default_filter: Option<&str>, quiet: bool) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = if quiet {
            EnvFilter::new("off")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or("info")))
        };
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}
