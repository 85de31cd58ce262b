use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const ENV_BACKEND_URL: &str = "GETMAN_BACKEND_URL";
pub const ENV_AUTH_TOKEN: &str = "GETMAN_AUTH_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "GETMAN_TIMEOUT_MS";
pub const ENV_DB_PATH: &str = "GETMAN_DB_PATH";

/// Runtime settings for the dispatcher and the backend stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Whole-request timeout in milliseconds. `0` disables it.
    pub timeout_ms: u64,
    pub proxy_url: Option<String>,
    pub verify_ssl: bool,
    pub max_redirects: usize,
    pub backend_url: Option<String>,
    /// Bearer token attached to every backend call.
    pub auth_token: Option<String>,
    pub database_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            proxy_url: None,
            verify_ssl: true,
            max_redirects: 10,
            backend_url: None,
            auth_token: None,
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|e| EngineError::Config {
            message: format!("Failed to read config file `{}`: {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| EngineError::Config {
            message: format!("Failed to parse config file `{}`: {e}", path.display()),
        })
    }

    /// Overlay `GETMAN_*` environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend_url = non_blank(url);
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            self.auth_token = non_blank(token);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw.trim().parse().map_err(|e| EngineError::Config {
                message: format!(
                    "{ENV_TIMEOUT_MS} must be a number of milliseconds, got `{raw}`: {e}"
                ),
            })?;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = non_blank(path).map(PathBuf::from);
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("getman.json");
        fs::write(&path, r#"{ "timeoutMs": 500, "backendUrl": "http://localhost:9000" }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.backend_url.as_deref(), Some("http://localhost:9000"));
        assert!(config.verify_ssl);
        assert_eq!(config.max_redirects, 10);
    }

    #[test]
    fn missing_file_is_default() {
        let config = EngineConfig::load(Path::new("/definitely/not/here.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_AUTH_TOKEN, " abc "),
            (ENV_TIMEOUT_MS, "0"),
            (ENV_BACKEND_URL, ""),
        ]);
        let base = EngineConfig {
            backend_url: Some("http://old".into()),
            ..EngineConfig::default()
        };

        let config = base
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.auth_token.as_deref(), Some("abc"));
        assert_eq!(config.backend_url, None);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn bad_timeout_is_config_error() {
        let err = EngineConfig::default()
            .apply_vars(|key| (key == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }
}
