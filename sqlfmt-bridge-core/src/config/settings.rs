//! Formatter settings for sqlfmt-bridge.
//!
//! `FormatSettings` mirrors the editor-side configuration surface (camelCase
//! JSON keys). Settings are persisted to the SQLite database as JSON and can
//! also be read from a JSON file supplied by the host.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::db::Database;

/// Database key under which settings are stored.
const SETTINGS_KEY: &str = "format_settings";

/// Default indent width when tabs are off.
pub const DEFAULT_SPACE_COUNT: u8 = 4;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown setting: {0}")]
    UnknownKey(String),
}

// =============================================================================
// Keyword Case
// =============================================================================

/// How sqlfmt should rewrite SQL keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum KeywordCase {
    Uppercase,
    Lowercase,
    /// Leave keywords as written.
    #[default]
    Unchanged,
}

impl From<String> for KeywordCase {
    /// Unknown values fall back to `Unchanged`.
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "uppercase" | "upper" => Self::Uppercase,
            "lowercase" | "lower" => Self::Lowercase,
            _ => Self::Unchanged,
        }
    }
}

impl std::fmt::Display for KeywordCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uppercase => write!(f, "uppercase"),
            Self::Lowercase => write!(f, "lowercase"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

// =============================================================================
// Format Settings
// =============================================================================

/// Immutable snapshot of the formatter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatSettings {
    /// Let sqlfmt pick up its own config file; all other options are ignored.
    pub use_config_file: bool,

    /// Replace newlines in the input before formatting.
    pub replace_newlines: bool,

    /// Normalize the whitespace in front of comments.
    pub replace_comment_pre_space: bool,

    /// Align groups of text (e.g. aliases) into columns.
    pub align_text_groups: bool,

    pub change_keyword_case: KeywordCase,

    /// Indent with tabs instead of spaces.
    pub use_tabs: bool,

    /// Spaces per indent level. Ignored when `use_tabs` is set; values
    /// sqlfmt cannot take (outside 0-255, fractional) read as unset.
    #[serde(deserialize_with = "lenient_count")]
    pub set_space_count: Option<u8>,

    /// Maximum line width in characters, same validity rules as above.
    #[serde(deserialize_with = "lenient_count")]
    pub set_char_count: Option<u8>,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            use_config_file: false,
            replace_newlines: false,
            replace_comment_pre_space: false,
            align_text_groups: false,
            change_keyword_case: KeywordCase::default(),
            use_tabs: false,
            set_space_count: Some(DEFAULT_SPACE_COUNT),
            set_char_count: None,
        }
    }
}

/// Accepts any JSON value, keeping only integers sqlfmt can parse as `u8`.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(count_from_value(&value))
}

fn count_from_value(value: &serde_json::Value) -> Option<u8> {
    let serde_json::Value::Number(number) = value else {
        return None;
    };
    if let Some(n) = number.as_u64() {
        return u8::try_from(n).ok();
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && (0.0..=255.0).contains(&f) => Some(f as u8),
        _ => None,
    }
}

impl FormatSettings {
    /// Setting keys as they appear in JSON.
    pub const KEYS: &'static [&'static str] = &[
        "useConfigFile",
        "replaceNewlines",
        "replaceCommentPreSpace",
        "alignTextGroups",
        "changeKeywordCase",
        "useTabs",
        "setSpaceCount",
        "setCharCount",
    ];

    /// Load settings from database, using defaults for missing values.
    ///
    /// If settings don't exist or can't be parsed, returns defaults.
    pub fn load(db: &Database) -> Self {
        match db.get_setting(SETTINGS_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<FormatSettings>(&json) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse settings, using defaults");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read settings, using defaults");
                Self::default()
            }
        }
    }

    /// Save settings to database.
    pub fn save(&self, db: &Database) -> Result<(), SettingsError> {
        let json = serde_json::to_string(self)?;
        db.set_setting(SETTINGS_KEY, &json)?;
        Ok(())
    }

    /// Parses a JSON settings object. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON settings file, e.g. one exported by the editor.
    pub fn from_json_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Returns a copy with `key` set to `raw`.
    ///
    /// `raw` is parsed as JSON when possible (`true`, `4`) and used as a
    /// plain string otherwise (`uppercase`).
    pub fn with_value(&self, key: &str, raw: &str) -> Result<Self, SettingsError> {
        if !Self::KEYS.contains(&key) {
            return Err(SettingsError::UnknownKey(key.to_string()));
        }

        let value = serde_json::from_str::<serde_json::Value>(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

        let mut object = serde_json::to_value(self)?;
        if let Some(map) = object.as_object_mut() {
            map.insert(key.to_string(), value);
        }

        Ok(serde_json::from_value(object)?)
    }

    /// Pretty JSON for display.
    pub fn to_pretty_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
