//! Adapter configuration
//!
//! Loadable from TOML; every field has a default so a partial file works.
//!
//! ```toml
//! tool_name = "DEHMatlab"
//! mapping_configuration_name = "thermal"
//! engine_version = "R2022b"
//! log_filter = "dst_core=debug,info"
//! ```

use crate::error::DstError;
use dst_repository::PLACEHOLDER_VALUE;
use dst_workspace::EngineVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DstConfig {
    /// Owner of the external identifier maps
    pub tool_name: String,
    /// Named mapping configuration
    pub mapping_configuration_name: String,
    /// Engine release to attach to
    pub engine_version: String,
    /// Where loaded scripts are copied (OS temp dir when unset)
    pub temp_directory: Option<PathBuf>,
    /// Engine command listing the workspace's variable names
    pub workspace_listing_command: String,
    /// Repository "no value" marker
    pub placeholder_value: String,
    /// Capacity of observable change channels
    pub change_channel_capacity: usize,
    /// `EnvFilter` directive
    pub log_filter: String,
    /// Emit JSON log lines
    pub json_logs: bool,
}

impl DstConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns `Configuration` if the document is malformed
    pub fn from_toml_str(source: &str) -> Result<Self, DstError> {
        let config: Self = toml::from_str(source).map_err(|e| DstError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read, `Configuration` if it is malformed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DstError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| DstError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), DstError> {
        if self.tool_name.trim().is_empty() {
            return Err(DstError::Configuration("tool_name must not be empty".into()));
        }
        if self.change_channel_capacity == 0 {
            return Err(DstError::Configuration(
                "change_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_mapping_configuration(mut self, name: impl Into<String>) -> Self {
        self.mapping_configuration_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_temp_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_directory = Some(path.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Engine version as the engine collaborator expects it
    #[inline]
    #[must_use]
    pub fn engine_version(&self) -> EngineVersion {
        EngineVersion::new(self.engine_version.clone())
    }

    /// Script copy directory
    #[must_use]
    pub fn script_directory(&self) -> PathBuf {
        self.temp_directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for DstConfig {
    fn default() -> Self {
        Self {
            tool_name: "DEHMatlab".to_string(),
            mapping_configuration_name: "default".to_string(),
            engine_version: EngineVersion::default().0,
            temp_directory: None,
            workspace_listing_command: "who".to_string(),
            placeholder_value: PLACEHOLDER_VALUE.to_string(),
            change_channel_capacity: 64,
            log_filter: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = DstConfig::new();
        assert_eq!(config.tool_name, "DEHMatlab");
        assert_eq!(config.mapping_configuration_name, "default");
        assert_eq!(config.engine_version().as_str(), "R2021a");
        assert_eq!(config.placeholder_value, "-");
        assert_eq!(config.change_channel_capacity, 64);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DstConfig::from_toml_str(
            r#"
            mapping_configuration_name = "thermal"
            engine_version = "R2022b"
            "#,
        )
        .unwrap();
        assert_eq!(config.mapping_configuration_name, "thermal");
        assert_eq!(config.engine_version, "R2022b");
        assert_eq!(config.tool_name, "DEHMatlab");
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let err = DstConfig::from_toml_str("tool_name = ").unwrap_err();
        assert!(matches!(err, DstError::Configuration(_)));

        let err = DstConfig::from_toml_str("change_channel_capacity = 0").unwrap_err();
        assert!(matches!(err, DstError::Configuration(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dst.toml");
        std::fs::write(&path, "tool_name = \"Other\"\n").unwrap();
        assert_eq!(DstConfig::load(&path).unwrap().tool_name, "Other");

        let missing = DstConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, DstError::Io { .. }));
    }
}
