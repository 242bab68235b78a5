//! Classification API settings.
//!
//! The values are supplied once, when the shell starts the core, and are
//! validated up front so that a missing model id or credential is reported
//! immediately instead of producing a malformed request later on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.clarifai.com";

pub const ENV_BASE_URL: &str = "MEALSCAN_API_BASE_URL";
pub const ENV_USER_ID: &str = "MEALSCAN_API_USER_ID";
pub const ENV_APP_ID: &str = "MEALSCAN_API_APP_ID";
pub const ENV_MODEL_ID: &str = "MEALSCAN_API_MODEL_ID";
pub const ENV_MODEL_VERSION_ID: &str = "MEALSCAN_API_MODEL_VERSION_ID";
pub const ENV_API_KEY: &str = "MEALSCAN_API_KEY";

const MAX_FIELD_LENGTH: usize = 256;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {field}")]
    Missing { field: &'static str },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub user_id: String,
    pub app_id: String,
    pub model_id: String,
    pub model_version_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

// The API key must never end up in logs.
impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("app_id", &self.app_id)
            .field("model_id", &self.model_id)
            .field("model_version_id", &self.model_version_id)
            .field("api_key_present", &self.api_key.is_some())
            .finish()
    }
}

impl ClassifierConfig {
    pub fn new(
        user_id: impl Into<String>,
        app_id: impl Into<String>,
        model_id: impl Into<String>,
        model_version_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: user_id.into(),
            app_id: app_id.into(),
            model_id: model_id.into(),
            model_version_id: model_version_id.into(),
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builds a config from a key lookup, e.g. `|key| std::env::var(key).ok()`.
    /// Absent values become empty strings and are caught by `validate`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let config = Self {
            base_url: value(ENV_BASE_URL)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_id: value(ENV_USER_ID).unwrap_or_default(),
            app_id: value(ENV_APP_ID).unwrap_or_default(),
            model_id: value(ENV_MODEL_ID).unwrap_or_default(),
            model_version_id: value(ENV_MODEL_VERSION_ID).unwrap_or_default(),
            api_key: value(ENV_API_KEY).filter(|v| !v.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.base_url)?;
        validate_path_segment("user_id", &self.user_id)?;
        validate_path_segment("app_id", &self.app_id)?;
        validate_path_segment("model_id", &self.model_id)?;
        validate_path_segment("model_version_id", &self.model_version_id)?;

        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "api_key",
                    reason: "cannot be blank when present".to_string(),
                });
            }
        }

        Ok(())
    }

    pub(crate) fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// Ids are spliced into the request path or body verbatim.
fn validate_path_segment(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing { field });
    }

    if value.len() > MAX_FIELD_LENGTH {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("exceeds maximum length of {MAX_FIELD_LENGTH} bytes"),
        });
    }

    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace())
    {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("invalid character {c:?}"),
        });
    }

    Ok(())
}

fn validate_base_url(url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: url.to_string(),
        reason,
    };

    if url.trim().is_empty() {
        return Err(ConfigError::Missing { field: "base_url" });
    }

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(invalid(format!(
            "invalid scheme '{scheme}', only 'http' and 'https' are allowed"
        )));
    }

    if parsed.host_str().is_none() {
        return Err(invalid("URL must have a host".to_string()));
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid("credentials in URL are not allowed".to_string()));
    }

    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> ClassifierConfig {
        ClassifierConfig::new("clarifai", "main", "food-item-recognition", "1d5fd481e0cf4826aa72ec3ff049e044")
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
        assert!(valid().with_api_key("abc123").validate().is_ok());
    }

    #[test]
    fn test_missing_model_id_fails_fast() {
        let config = ClassifierConfig {
            model_id: "  ".into(),
            ..valid()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing { field: "model_id" })
        );
    }

    #[test]
    fn test_ids_cannot_escape_path() {
        let config = ClassifierConfig {
            model_version_id: "1/../../admin".into(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "model_version_id", .. })
        ));
    }

    #[test]
    fn test_blank_api_key_rejected() {
        assert!(valid().with_api_key(" ").validate().is_err());
    }

    #[test]
    fn test_base_url_rules() {
        assert!(valid().with_base_url("ftp://api.clarifai.com").validate().is_err());
        assert!(valid().with_base_url("not a url").validate().is_err());
        assert!(valid().with_base_url("https://user:pw@api.clarifai.com").validate().is_err());
        assert!(valid().with_base_url("https://api.clarifai.com?x=1").validate().is_err());
        assert!(valid().with_base_url("http://127.0.0.1:8080").validate().is_ok());
    }

    #[test]
    fn test_trimmed_base_url() {
        let config = valid().with_base_url("https://api.clarifai.com/");
        assert_eq!(config.trimmed_base_url(), "https://api.clarifai.com");
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let config = ClassifierConfig::from_lookup(lookup(&[
            (ENV_USER_ID, "clarifai"),
            (ENV_APP_ID, "main"),
            (ENV_MODEL_ID, "food-item-recognition"),
            (ENV_MODEL_VERSION_ID, " v1 "),
            (ENV_API_KEY, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model_version_id, "v1");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_from_lookup_reports_first_missing_field() {
        let result = ClassifierConfig::from_lookup(lookup(&[
            (ENV_USER_ID, "clarifai"),
            (ENV_MODEL_ID, "food-item-recognition"),
            (ENV_MODEL_VERSION_ID, "v1"),
        ]));
        assert_eq!(result, Err(ConfigError::Missing { field: "app_id" }));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", valid().with_api_key("top-secret"));
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("api_key_present: true"));
    }
}
