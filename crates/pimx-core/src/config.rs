//! Connector settings.
//!
//! Settings are flat string key/value pairs. They come from built-in
//! defaults, an optional YAML file and `PIMX_`-prefixed environment
//! variables, later sources overriding earlier ones. [`ExportSettings`]
//! is the typed view the engine runs on.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::ChannelId;
use crate::mapping::ExportMapping;

/// Setting keys.
pub mod keys {
    pub const CHANNEL_ID: &str = "CHANNEL_ID";
    pub const PUBLISH_FOLDER: &str = "PUBLISH_FOLDER";
    pub const RESOURCE_FOLDER: &str = "RESOURCE_FOLDER";
    pub const CVL_FOLDER: &str = "CVL_FOLDER";
    pub const PUBLISH_AS_SINGLE_FILE: &str = "PUBLISH_AS_SINGLE_FILE";
    pub const MAX_ENTITIES_IN_PUBLISHED_FILE: &str = "MAX_ENTITIES_IN_PUBLISHED_FILE";
    pub const UPDATE_PARENT_WHEN_ADD_ENTITY: &str = "UPDATE_PARENT_WHEN_ADD_ENTITY";
    pub const MAPPING: &str = "MAPPING";

    /// Every recognized key.
    pub const ALL: [&str; 8] = [
        CHANNEL_ID,
        PUBLISH_FOLDER,
        RESOURCE_FOLDER,
        CVL_FOLDER,
        PUBLISH_AS_SINGLE_FILE,
        MAX_ENTITIES_IN_PUBLISHED_FILE,
        UPDATE_PARENT_WHEN_ADD_ENTITY,
        MAPPING,
    ];
}

/// Prefix of the environment variables read by [`SettingsMap::from_env`].
pub const ENV_PREFIX: &str = "PIMX_";

/// Raw connector settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsMap(BTreeMap<String, String>);

impl SettingsMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in defaults. `MAPPING` has no default.
    pub fn defaults() -> Self {
        Self::new()
            .with(keys::CHANNEL_ID, "52906")
            .with(keys::PUBLISH_FOLDER, "Publish")
            .with(keys::RESOURCE_FOLDER, "Publish/Resources")
            .with(keys::CVL_FOLDER, "Publish/CVLs")
            .with(keys::PUBLISH_AS_SINGLE_FILE, "True")
            .with(keys::MAX_ENTITIES_IN_PUBLISHED_FILE, "0")
            .with(keys::UPDATE_PARENT_WHEN_ADD_ENTITY, "True")
    }

    /// Parse a YAML mapping of settings.
    ///
    /// Scalar values are taken as their text. A nested mapping or sequence
    /// (typically `MAPPING`) is re-rendered as a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)?;
        let mut map = BTreeMap::new();
        for (key, value) in raw {
            let text = match value {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::String(s) => s,
                other => serde_yaml::to_string(&other)?,
            };
            map.insert(key, text);
        }
        Ok(Self(map))
    }

    /// Read a YAML settings file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Recognized keys present in the environment as `PIMX_<KEY>`.
    pub fn from_env() -> Self {
        let mut map = BTreeMap::new();
        for key in keys::ALL {
            if let Some(value) = env_setting(key) {
                map.insert(key.to_string(), value);
            }
        }
        Self(map)
    }

    /// Overlay `other` onto `self`; keys in `other` win.
    pub fn merge(mut self, other: SettingsMap) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// A present, non-blank value or [`ConfigError::MissingSetting`].
    pub fn required(&self, key: &str) -> Result<&str, ConfigError> {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::MissingSetting {
                key: key.to_string(),
            }),
        }
    }
}

fn env_setting(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}")).ok()
}

// ─── Typed settings ─────────────────────────────────────────────────

/// Resolved settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub channel_id: ChannelId,
    pub publish_folder: String,
    pub resource_folder: String,
    pub cvl_folder: String,
    /// Publish each entity type as one or more batch documents.
    pub publish_as_single_file: bool,
    /// Upper bound on entities per batch document; 0 is unbounded.
    pub max_entities_per_file: usize,
    pub update_parent_on_add: bool,
    pub mapping: ExportMapping,
}

impl ExportSettings {
    /// Resolve and check every setting.
    pub fn from_settings(settings: &SettingsMap) -> Result<Self, ConfigError> {
        let raw_channel = settings.required(keys::CHANNEL_ID)?;
        let channel_id = raw_channel
            .trim()
            .parse::<i64>()
            .map(ChannelId)
            .map_err(|e| ConfigError::InvalidSetting {
                key: keys::CHANNEL_ID.to_string(),
                value: raw_channel.to_string(),
                reason: e.to_string(),
            })?;

        let mapping = ExportMapping::from_yaml(settings.required(keys::MAPPING)?)?;

        Ok(Self {
            channel_id,
            publish_folder: settings.required(keys::PUBLISH_FOLDER)?.to_string(),
            resource_folder: settings.required(keys::RESOURCE_FOLDER)?.to_string(),
            cvl_folder: settings.required(keys::CVL_FOLDER)?.to_string(),
            publish_as_single_file: parse_single_file(
                settings.get(keys::PUBLISH_AS_SINGLE_FILE),
            ),
            max_entities_per_file: parse_max_entities(
                settings.get(keys::MAX_ENTITIES_IN_PUBLISHED_FILE),
            ),
            update_parent_on_add: parse_update_parent(
                settings.get(keys::UPDATE_PARENT_WHEN_ADD_ENTITY),
            ),
            mapping,
        })
    }
}

/// Unparsable or absent values mean unbounded.
fn parse_max_entities(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Unparsable or absent values mean single-file.
fn parse_single_file(raw: Option<&str>) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "false" => false,
        _ => true,
    }
}

/// Only an explicit `false` disables the policy.
fn parse_update_parent(raw: Option<&str>) -> bool {
    !raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
}
