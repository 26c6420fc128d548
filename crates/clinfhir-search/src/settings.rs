use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Search translation settings, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_count")]
    pub default_count: usize,
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    /// Namespace expected in `<namespace>|<id>` identifier searches
    #[serde(default = "default_identifier_namespace")]
    pub identifier_namespace: String,
    /// Name of the continuation token parameter
    #[serde(default = "default_cursor_param")]
    pub cursor_param: String,
    /// Per-resource overrides keyed by resource type
    #[serde(default)]
    pub resources: IndexMap<String, ResourceSettings>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_count() -> usize {
    20
}
fn default_max_count() -> usize {
    20
}
fn default_identifier_namespace() -> String {
    "http://data-dictionary.clinfhir.org/patient-display-id".into()
}
fn default_cursor_param() -> String {
    "searchId".into()
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
            identifier_namespace: default_identifier_namespace(),
            cursor_param: default_cursor_param(),
            resources: IndexMap::new(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSettings {
    #[serde(default)]
    pub default_count: Option<usize>,
    #[serde(default)]
    pub max_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SearchSettings {
    /// Effective `(default_count, max_count)` for a resource type.
    ///
    /// Override keys match case-insensitively since environment sources
    /// lowercase them.
    pub fn count_limits(&self, resource_type: &str) -> (usize, usize) {
        let overrides = self
            .resources
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(resource_type))
            .map(|(_, r)| r);
        (
            overrides
                .and_then(|r| r.default_count)
                .unwrap_or(self.default_count),
            overrides
                .and_then(|r| r.max_count)
                .unwrap_or(self.max_count),
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_count == 0 {
            return Err("default_count must be > 0".into());
        }
        if self.max_count == 0 {
            return Err("max_count must be > 0".into());
        }
        if self.default_count > self.max_count {
            return Err("default_count must be <= max_count".into());
        }
        for resource_type in self.resources.keys() {
            let (default, max) = self.count_limits(resource_type);
            if default == 0 || max == 0 || default > max {
                return Err(format!(
                    "resources.{resource_type}: default_count must be > 0 and <= max_count"
                ));
            }
        }
        if self.identifier_namespace.is_empty() || self.identifier_namespace.contains('|') {
            return Err("identifier_namespace must be non-empty and must not contain '|'".into());
        }
        if self.cursor_param.is_empty() || self.cursor_param.starts_with('_') {
            return Err("cursor_param must be non-empty and must not start with '_'".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

pub mod loader {
    use super::SearchSettings;
    use clinfhir_core::CoreError;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default settings file looked up in the working directory.
    pub const DEFAULT_SETTINGS_FILE: &str = "clinfhir.toml";

    /// Load settings from a TOML file plus `CLINFHIR__*` environment overrides.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_settings(path: Option<&str>) -> Result<SearchSettings, CoreError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_SETTINGS_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CLINFHIR__MAX_COUNT=50
        builder = builder.add_source(
            Environment::with_prefix("CLINFHIR")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| CoreError::configuration(format!("config build error: {e}")))?;
        let merged: SearchSettings = cfg
            .try_deserialize()
            .map_err(|e| CoreError::configuration(format!("config deserialize error: {e}")))?;
        merged.validate().map_err(CoreError::configuration)?;
        tracing::debug!(
            default_count = merged.default_count,
            max_count = merged.max_count,
            "search settings loaded"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = SearchSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.count_limits("Patient"), (20, 20));
        assert_eq!(settings.cursor_param, "searchId");
    }

    #[test]
    fn test_validate_rejects_bad_counts() {
        let settings = SearchSettings {
            default_count: 50,
            ..SearchSettings::default()
        };
        assert_eq!(
            settings.validate().unwrap_err(),
            "default_count must be <= max_count"
        );

        let mut settings = SearchSettings::default();
        settings.resources.insert(
            "Patient".into(),
            ResourceSettings {
                default_count: Some(0),
                max_count: None,
            },
        );
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_separator_in_namespace() {
        let settings = SearchSettings {
            identifier_namespace: "urn:a|b".into(),
            ..SearchSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
default_count = 10
max_count = 50
cursor_param = "page_token"

[resources.DiagnosticReport]
max_count = 20

[logging]
level = "debug"
"#
        )
        .unwrap();

        let settings = loader::load_settings(file.path().to_str()).unwrap();
        assert_eq!(settings.count_limits("Patient"), (10, 50));
        assert_eq!(settings.count_limits("DiagnosticReport"), (10, 20));
        assert_eq!(settings.cursor_param, "page_token");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "default_count = 0").unwrap();
        let err = loader::load_settings(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("default_count must be > 0"));
    }
}
