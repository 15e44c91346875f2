//! # crm-settings
//!
//! Configuration for the CRM realtime hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CrmSettings::default()`]
//! 2. **User file**: `~/.crm/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CRM_*` overrides (highest priority)
//!
//! The loaded value is validated once and then passed explicitly to the
//! components that need it; there is no process-wide settings global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, crm_home, deep_merge, load_settings, load_settings_from_path,
    resolve_db_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
