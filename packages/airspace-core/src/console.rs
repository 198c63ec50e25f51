// Log output for hosts embedding the airspace core.
//
// The library only emits `tracing` events; installing a subscriber is the
// host's choice. This one writes to stderr.
use tracing_subscriber::EnvFilter;

/// Default directive when neither `filter` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber.
///
/// `filter` takes precedence over `RUST_LOG`. Returns `false` when a global
/// subscriber was already installed, which is harmless.
pub fn init_logging(filter: Option<&str>) -> bool {
    let env_filter = match filter {
        Some(directives) => EnvFilter::builder().parse_lossy(directives),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
