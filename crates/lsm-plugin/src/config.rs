//! Plugin configuration.

/// Plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Description returned by `plugin_info`.
    pub description: String,

    /// Version returned by `plugin_info`.
    pub version: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            description: "Storage plugin".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl PluginConfig {
    /// Creates a configuration with the given description and version.
    pub fn new(description: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            version: version.into(),
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}
