//! Configuration loading and management

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::ConfigError;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind (e.g., "0.0.0.0:8080")
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Prefix under which every route is nested (e.g., "/api")
    #[serde(default)]
    pub base_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_path: String::new(),
        }
    }
}

impl ServerSettings {
    /// Base path with a single leading slash and no trailing slash;
    /// empty when routes are served at the root
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Declaration of one endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// URL segment and storage collection
    pub slug: Option<String>,

    /// Name of a model registered on the server builder
    pub model: Option<String>,

    /// Fields clients may filter on (defaults to all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Vec<String>>,

    /// Fields returned to clients (defaults to all)
    #[serde(default, alias = "return", skip_serializing_if = "Option::is_none")]
    pub visible: Option<Vec<String>>,
}

/// Complete API configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse(yaml, "<string>")
    }

    fn parse(yaml: &str, source_name: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }
}
