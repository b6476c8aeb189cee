//! Application environment

use serde::Deserialize;

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; failure outcomes carry internal detail
    Development,
    /// Everything else
    #[default]
    Production,
}

impl Environment {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Application settings
///
/// ```toml
/// [app]
/// environment = "development"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment
    pub environment: Environment,
}

impl AppConfig {
    /// Whether internal error detail may be shown to callers
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_production() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.is_development());
    }

    #[test]
    fn test_development() {
        let config: AppConfig = toml::from_str("environment = \"development\"").unwrap();
        assert!(config.is_development());
        assert_eq!(config.environment.as_str(), "development");
    }
}
