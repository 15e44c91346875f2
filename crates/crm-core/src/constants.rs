//! Package-level constants.

/// Current version of the hub (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "crm-hub";

/// Default maximum length (in characters) of a conversation's last-message summary.
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 50;
