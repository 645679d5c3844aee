/// Logging setup shared by the binaries.
///
/// Library code logs through `tracing` macros with structured fields
/// (`station = %id`, `attempt`, `delay_ms`). The binaries call `init` once at
/// startup; `RUST_LOG` overrides the binary's default directive.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "rivers_service=info";

/// Builds the filter: `RUST_LOG` if it parses, `default_directive` otherwise.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs the global fmt subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(false)
        .try_init();
}
