//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution, which
//! is sandbox-transparent on macOS and iOS (returns container-relative paths
//! automatically).
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Models | `~/Library/Application Support/voxpipe/models/` | `~/.local/share/voxpipe/models/` |
//! | Config | `~/Library/Application Support/voxpipe/` | `~/.config/voxpipe/` |
//!
//! # Environment Overrides
//!
//! - `VOXPIPE_DATA_DIR`: overrides [`data_dir`]
//! - `VOXPIPE_CONFIG_DIR`: overrides [`config_dir`]

use std::ffi::OsString;
use std::path::PathBuf;

const APP_NAME: &str = "voxpipe";

fn resolve(override_dir: Option<OsString>, platform: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Some(dir) = override_dir {
        return PathBuf::from(dir);
    }
    platform
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(fallback))
}

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/voxpipe/` by default. Override with
/// the `VOXPIPE_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve(
        std::env::var_os("VOXPIPE_DATA_DIR"),
        dirs::data_dir(),
        "/tmp/voxpipe-data",
    )
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/voxpipe/` by default. Override with
/// the `VOXPIPE_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve(
        std::env::var_os("VOXPIPE_CONFIG_DIR"),
        dirs::config_dir(),
        "/tmp/voxpipe-config",
    )
}

/// Root of the per-language model directories (`data_dir()/models/`).
#[must_use]
pub fn models_dir() -> PathBuf {
    data_dir().join("models")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
