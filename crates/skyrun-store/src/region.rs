//! Region resolution.
//!
//! Precedence: `SKYRUN_REGION`, then the standard cloud environment
//! variables, then the stored environment config, then the built-in
//! default.

use skyrun_types::DEFAULT_REGION;

const ENV_VARS: &[&str] = &["SKYRUN_REGION", "AWS_DEFAULT_REGION", "AWS_REGION"];

/// Resolve the effective region for an operation.
#[must_use]
pub fn resolve_region(stored: Option<&str>) -> String {
    resolve_region_with(|var| std::env::var(var).ok(), stored)
}

fn resolve_region_with(
    lookup: impl Fn(&str) -> Option<String>,
    stored: Option<&str>,
) -> String {
    for var in ENV_VARS {
        if let Some(value) = lookup(var) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    stored
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}
