//! Diagnostic tracing to stderr.
//!
//! Separate from the JSONL run log (`history`), which is a product artifact
//! written only when `--log` is given. Tracing is controlled by `RUST_LOG`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `warn`, or
/// `sopflow=debug` with `verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,sopflow=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // a subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sf017_init_twice_is_harmless() {
        init(false);
        init(true);
        tracing::debug!("after init");
    }
}
