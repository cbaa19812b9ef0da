//! Engine configuration.
//!
//! Loaded from TOML (`lodestar.toml`) or built in code:
//!
//! ```toml
//! language-version = "1.3"
//! dynamic-scope = false
//! caller-inspection = "deny"
//! activation-names = ["arguments"]
//! max-diagnostics = 100
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Script language version.
///
/// Versions up to 1.3 keep the legacy `arguments.caller` slot; 1.2 makes
/// `x.length` observe the activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LanguageVersion {
    /// Latest behavior
    #[default]
    #[serde(rename = "default")]
    Default,
    /// JavaScript 1.0
    #[serde(rename = "1.0")]
    V1_0,
    /// JavaScript 1.1
    #[serde(rename = "1.1")]
    V1_1,
    /// JavaScript 1.2
    #[serde(rename = "1.2")]
    V1_2,
    /// JavaScript 1.3
    #[serde(rename = "1.3")]
    V1_3,
    /// JavaScript 1.4
    #[serde(rename = "1.4")]
    V1_4,
    /// JavaScript 1.5
    #[serde(rename = "1.5")]
    V1_5,
}

impl LanguageVersion {
    /// Numeric code (`0` for default, `100`..`150` otherwise).
    pub fn code(self) -> u32 {
        match self {
            LanguageVersion::Default => 0,
            LanguageVersion::V1_0 => 100,
            LanguageVersion::V1_1 => 110,
            LanguageVersion::V1_2 => 120,
            LanguageVersion::V1_3 => 130,
            LanguageVersion::V1_4 => 140,
            LanguageVersion::V1_5 => 150,
        }
    }

    /// Versions that expose `arguments.caller`.
    pub fn has_legacy_caller(self) -> bool {
        self != LanguageVersion::Default && self.code() <= 130
    }
}

/// Whether scripts may walk the caller chain through `fn.arguments`,
/// `arguments.caller` and `fn.caller`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerInspection {
    /// Caller chain is visible
    #[default]
    Allow,
    /// Caller chain reads as `null`
    Deny,
}

/// Engine-wide settings shared by compilation and invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Language version compiled units are tagged with
    pub language_version: LanguageVersion,
    /// Functions resolve free names in the caller's scope
    pub dynamic_scope: bool,
    /// Caller chain visibility
    pub caller_inspection: CallerInspection,
    /// Names whose use forces a heap activation
    pub activation_names: Vec<String>,
    /// Diagnostics recorded per compilation
    pub max_diagnostics: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language_version: LanguageVersion::Default,
            dynamic_scope: false,
            caller_inspection: CallerInspection::Allow,
            activation_names: vec!["arguments".to_string()],
            max_diagnostics: 100,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_diagnostics == 0 {
            return Err(Error::InvalidConfig(
                "max-diagnostics must be at least 1".to_string(),
            ));
        }
        if let Some(name) = self.activation_names.iter().find(|n| n.is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "activation-names contains an empty name: {:?}",
                name
            )));
        }
        Ok(())
    }

    /// Returns true if using `name` forces a heap activation.
    pub fn is_activation_name(&self, name: &str) -> bool {
        self.activation_names.iter().any(|n| n == name)
    }

    /// Returns true if the caller chain is visible.
    pub fn allows_caller_inspection(&self) -> bool {
        self.caller_inspection == CallerInspection::Allow
    }
}
