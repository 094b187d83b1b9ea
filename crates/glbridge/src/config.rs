use std::path::PathBuf;

use glbridge_handles::{Category, ZeroHandle};
use serde::{Deserialize, Serialize};

use crate::host::ContextAttributes;

/// Where image decoding runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMode {
    /// Decode on a worker thread; results are applied by the next pump that sees them.
    #[default]
    Threaded,
    /// Decode inline during the next pump. Deterministic; used by tests.
    Deferred,
}

/// Session configuration for a [`crate::Bridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub context: ContextAttributes,
    /// Categories whose handle 0 is the first real object instead of the "no object" sentinel.
    pub dense_handles: Vec<Category>,
    /// Root directory `glLoadTexture` URLs are resolved against.
    pub asset_root: PathBuf,
    pub decoder: DecoderMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            context: ContextAttributes::default(),
            dense_handles: Vec::new(),
            asset_root: PathBuf::from("."),
            decoder: DecoderMode::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn zero_handle(&self, category: Category) -> ZeroHandle {
        if self.dense_handles.contains(&category) {
            ZeroHandle::Object
        } else {
            ZeroHandle::Sentinel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PowerPreference;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(BridgeConfig::from_json_str("{}").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn dense_categories_switch_slot_zero() {
        let config = BridgeConfig::from_json_str(
            r#"{
                "dense_handles": ["shader", "program"],
                "decoder": "deferred",
                "context": { "antialias": false, "power_preference": "high_performance" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.zero_handle(Category::Shader), ZeroHandle::Object);
        assert_eq!(config.zero_handle(Category::Program), ZeroHandle::Object);
        assert_eq!(config.zero_handle(Category::Texture), ZeroHandle::Sentinel);
        assert_eq!(config.decoder, DecoderMode::Deferred);
        assert!(!config.context.antialias);
        assert!(config.context.stencil);
        assert_eq!(config.context.power_preference, PowerPreference::HighPerformance);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(BridgeConfig::from_json_str(r#"{ "dense": [] }"#).is_err());
    }
}
