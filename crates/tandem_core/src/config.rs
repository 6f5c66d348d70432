//! # Channel Configuration
//!
//! Tunables for the slot policy. Loaded once at startup from TOML, or built
//! in code with struct-update syntax over [`ChannelConfig::default`].
//!
//! ```toml
//! [channel]
//! eager_dual_slot = false
//! skip_unchanged_writes = true
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ChannelError, ChannelResult};

/// Configuration for a [`BufferChannel`](crate::BufferChannel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Allocate both slots up front instead of promoting on first contention.
    ///
    /// Trades memory for never paying the promotion copy on a hot path.
    pub eager_dual_slot: bool,

    /// Copy-in helpers (`write_all`, `write_single_element`, `set_uniform`,
    /// `set_element`) compare the new bytes with the current content and do not
    /// advance the stamp when nothing changed.
    ///
    /// Off by default: every write that supplies data advances the stamp, which
    /// may cost redundant uploads for idempotent writers.
    pub skip_unchanged_writes: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            eager_dual_slot: false,
            skip_unchanged_writes: false,
        }
    }
}

/// Top-level layout of a tandem config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    channel: ChannelConfig,
}

impl ChannelConfig {
    /// Parses a configuration from TOML text.
    ///
    /// The settings live under a `[channel]` table; a missing table yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> ChannelResult<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| ChannelError::InvalidConfig(e.to_string()))?;
        Ok(file.channel)
    }

    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> ChannelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChannelError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}
