//! Engine trace output.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
#[must_use]
pub const fn default_directive(enable_trace: bool) -> &'static str {
    if enable_trace {
        "spool_core=trace"
    } else {
        "spool_core=warn"
    }
}

/// Installs a stderr subscriber for engine traces.
///
/// `RUST_LOG` takes precedence over `enable_trace`. Returns false if a global
/// subscriber was already installed, in which case it is left in place.
pub fn init_tracing(enable_trace: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(enable_trace)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_follows_flag() {
        assert_eq!(default_directive(true), "spool_core=trace");
        assert_eq!(default_directive(false), "spool_core=warn");
    }

    #[test]
    fn second_install_is_refused() {
        let _ = init_tracing(false);
        assert!(!init_tracing(true));
    }
}
