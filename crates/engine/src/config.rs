//! Engine settings. Every field has a default, so an empty TOML document is a
//! valid config.

use serde::{Deserialize, Serialize};

use cartsync_core::{CacheKey, KeySpec};

use crate::error::EngineError;

/// ```toml
/// default_key_field = "id"
/// # cache_key_prefix = "admin"
/// warn_on_update_as_upsert = true
/// cancel_in_flight_on_speculation = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Key column used when a request carries no key specification.
    #[serde(default = "default_key_field")]
    pub default_key_field: String,
    /// Leading part prepended to the default per-collection cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key_prefix: Option<String>,
    /// Log batch updates, which go out as upserts, at warn instead of debug.
    #[serde(default = "default_true")]
    pub warn_on_update_as_upsert: bool,
    /// Cancel in-flight reads of the target keys before a speculative edit.
    #[serde(default = "default_true")]
    pub cancel_in_flight_on_speculation: bool,
}

fn default_key_field() -> String {
    cartsync_core::key::DEFAULT_KEY_FIELD.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_key_field: default_key_field(),
            cache_key_prefix: None,
            warn_on_update_as_upsert: true,
            cancel_in_flight_on_speculation: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.default_key_field.is_empty() {
            return Err(EngineError::Config("default_key_field is empty".into()));
        }
        Ok(config)
    }

    pub fn default_key_spec(&self) -> KeySpec {
        KeySpec::Single(self.default_key_field.clone())
    }

    /// Key invalidated after a mutation that names no keys of its own.
    pub fn default_cache_key(&self, collection: &str) -> CacheKey {
        match &self.cache_key_prefix {
            Some(prefix) => CacheKey::new([prefix.as_str(), collection]),
            None => CacheKey::collection(collection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn toml_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            default_key_field = "uuid"
            cache_key_prefix = "admin"
            warn_on_update_as_upsert = false
            "#,
        )
        .unwrap();
        assert_eq!(config.default_key_spec(), KeySpec::Single("uuid".into()));
        assert_eq!(
            config.default_cache_key("brands"),
            CacheKey::new(["admin", "brands"])
        );
        assert!(!config.warn_on_update_as_upsert);
        assert!(config.cancel_in_flight_on_speculation);
    }

    #[test]
    fn rejects_empty_key_field() {
        let err = EngineConfig::from_toml_str(r#"default_key_field = """#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn json_round_trip_skips_absent_prefix() {
        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert!(json.get("cache_key_prefix").is_none());
        assert_eq!(json["default_key_field"], "id");
    }
}
