//! Persisted application settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix applied to every settings key in the key-value namespace.
pub const SETTING_KEY_PREFIX: &str = "setting_";

/// The fixed set of settings the application persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingName {
    /// Remote endpoint locator. Empty disables sync.
    #[serde(rename = "syncToken")]
    SyncToken,
    /// Timestamp of the last successful sync signal. Empty means never.
    #[serde(rename = "lastSyncDate")]
    LastSyncDate,
}

impl SettingName {
    pub const ALL: [SettingName; 2] = [SettingName::SyncToken, SettingName::LastSyncDate];

    /// Returns the wire name of this setting.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyncToken => "syncToken",
            Self::LastSyncDate => "lastSyncDate",
        }
    }

    /// Returns the key under which this setting is persisted.
    pub fn storage_key(self) -> String {
        format!("{SETTING_KEY_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for SettingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string does not name a known setting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown setting: {0}")]
pub struct ParseSettingNameError(pub String);

impl FromStr for SettingName {
    type Err = ParseSettingNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syncToken" => Ok(Self::SyncToken),
            "lastSyncDate" => Ok(Self::LastSyncDate),
            other => Err(ParseSettingNameError(other.to_string())),
        }
    }
}

/// A single setting value. Empty string denotes "unset".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub name: SettingName,
    pub value: String,
}

impl Setting {
    pub fn new(name: SettingName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}
