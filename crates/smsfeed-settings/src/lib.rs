//! # smsfeed-settings
//!
//! Startup configuration. Loading order, lowest priority first:
//!
//! 1. Compiled defaults ([`Settings::default()`])
//! 2. Optional JSON settings file
//! 3. `.env` file in the working directory (loaded into the process env)
//! 4. Environment variables
//!
//! Settings are read once and are immutable afterwards.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_with};
pub use types::Settings;
