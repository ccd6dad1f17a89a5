// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Viewer configuration and its storage port.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use cad_scene_port::MAX_BATCH;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Key under which the viewer config is stored.
pub const VIEWER_CONFIG_KEY: &str = "cad_viewer";

/// Narrowest allowed CAD panel width in pixels.
pub const MIN_CAD_WIDTH: u32 = 640;
/// Narrowest allowed tree panel width in pixels.
pub const MIN_TREE_WIDTH: u32 = 240;

/// UI theme.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// Light background.
    #[default]
    Light,
    /// Dark background.
    Dark,
}

/// Settings of one viewer instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ViewerConfig {
    /// CAD panel width in pixels.
    pub cad_width: u32,
    /// Panel height in pixels.
    pub height: u32,
    /// Tree panel width in pixels.
    pub tree_width: u32,
    /// UI theme.
    pub theme: Theme,
    /// Minimum spacing between coalesced outbound view messages.
    pub frame_interval_ms: u64,
    /// Mesh decodes run per tick.
    pub decode_budget: usize,
    /// Report local camera changes to the kernel.
    pub sync_view: bool,
    /// Largest accepted delta batch per attribute update.
    pub max_batch: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cad_width: 800,
            height: 600,
            tree_width: MIN_TREE_WIDTH,
            theme: Theme::Light,
            frame_interval_ms: 16,
            decode_budget: 4,
            sync_view: false,
            max_batch: MAX_BATCH,
        }
    }
}

impl ViewerConfig {
    /// Frame interval as a duration.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Check size and batch constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cad_width < MIN_CAD_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "cad_width {} is below {MIN_CAD_WIDTH}",
                self.cad_width
            )));
        }
        if self.tree_width < MIN_TREE_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "tree_width {} is below {MIN_TREE_WIDTH}",
                self.tree_width
            )));
        }
        if self.height == 0 {
            return Err(ConfigError::Invalid("height must be positive".into()));
        }
        if self.max_batch == 0 {
            return Err(ConfigError::Invalid("max_batch must be positive".into()));
        }
        Ok(())
    }
}

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A value violates a constraint.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Serializes config values and delegates storage to a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load and deserialize a value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a value for `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Stored viewer config (defaults when missing), validated.
    pub fn load_viewer(&self) -> Result<ViewerConfig, ConfigError> {
        let config: ViewerConfig = self.load(VIEWER_CONFIG_KEY)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Validate and persist a viewer config.
    pub fn save_viewer(&self, config: &ViewerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.save(VIEWER_CONFIG_KEY, config)
    }
}

/// In-memory store, used in the browser and in tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blobs: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.blobs
            .borrow()
            .get(key)
            .cloned()
            .ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.blobs.borrow_mut().insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ViewerConfig::default().validate().unwrap();
    }

    #[test]
    fn narrow_panels_are_rejected() {
        let cfg = ViewerConfig {
            cad_width: 320,
            ..ViewerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        let cfg = ViewerConfig {
            tree_width: 100,
            ..ViewerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_config_loads_defaults() {
        let svc = ConfigService::new(MemoryConfigStore::new());
        assert_eq!(svc.load_viewer().unwrap(), ViewerConfig::default());
    }

    #[test]
    fn saved_config_round_trips_through_store() {
        let svc = ConfigService::new(MemoryConfigStore::new());
        let cfg = ViewerConfig {
            theme: Theme::Dark,
            sync_view: true,
            ..ViewerConfig::default()
        };
        svc.save_viewer(&cfg).unwrap();
        assert_eq!(svc.load_viewer().unwrap(), cfg);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let store = MemoryConfigStore::new();
        store
            .save_raw(VIEWER_CONFIG_KEY, br#"{"theme":"dark"}"#)
            .unwrap();
        let cfg = ConfigService::new(store).load_viewer().unwrap();
        assert_eq!(cfg.theme, Theme::Dark);
        assert_eq!(cfg.cad_width, 800);
    }
}
