//! Gateway configuration: environment first, `user_config.toml` as the key
//! fallback so a hosted deployment can run without editing `.env`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lilly_core::bridge::DEFAULT_MODEL;

/// Origins allowed in development when `ALLOWED_ORIGINS` is unset.
const DEV_ORIGINS: &[&str] = &[
    "http://127.0.0.1:5500",
    "http://localhost:5500",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub api_key: Option<String>,
    pub model: String,
    /// Allowed CORS origins. Empty means allow any origin.
    pub allowed_origins: Vec<String>,
    /// "production" or "development"; reported by /health.
    pub env: String,
    /// Static web UI directory; when set, served at `/` and `/ui`.
    pub frontend_dir: Option<PathBuf>,
    /// Requests allowed per client IP per window.
    pub rate_limit: u32,
    /// Rate-limit window in seconds.
    pub rate_window_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let env = std::env::var("LILLY_ENV")
            .ok()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "development".to_string());

        let allowed_origins = match env_opt_string("ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None if env == "production" => Vec::new(),
            None => DEV_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        let api_key = env_opt_string("OPENAI_API_KEY").or_else(|| {
            UserConfig::load()
                .ok()
                .and_then(|config| config.api_key)
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        });

        Self {
            port: env_u16("PORT", 3000),
            api_key,
            model: env_opt_string("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            allowed_origins,
            env,
            frontend_dir: env_opt_string("LILLY_FRONTEND_DIR").map(PathBuf::from),
            rate_limit: env_u32("LILLY_RATE_LIMIT", 60),
            rate_window_secs: env_u64("LILLY_RATE_WINDOW_SECS", 60),
        }
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u16(name: &str, default: u16) -> u16 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Operator settings stored next to the binary in `user_config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// OpenAI API key; the environment variable wins when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl UserConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from_path(Path::new("user_config.toml"))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_config_parses_partial_toml() {
        let config: UserConfig = toml::from_str("api_key = \"sk-test\"").unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert!(config.model.is_none());
    }

    #[test]
    fn test_user_config_missing_file_is_default() {
        let config = UserConfig::load_from_path(Path::new("./nonexistent_config.toml")).unwrap();
        assert!(config.api_key.is_none());
    }
}
