//! Logging for the skyrun binary.
//!
//! Diagnostics go to stderr so command output stays pipeable. The
//! `RUST_LOG` env var overrides the `--log-level` flag when set;
//! otherwise the flag applies to the skyrun crates only and SDK
//! internals stay at `warn`.

use tracing_subscriber::EnvFilter;

/// Filter directives scoping `level` to skyrun's own crates.
fn default_directives(level: &str) -> String {
    format!(
        "warn,skyrun={level},skyrun_core={level},skyrun_store={level},skyrun_aws={level},skyrun_types={level}"
    )
}

pub fn init(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
