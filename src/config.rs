//! Environment-driven configuration.
//!
//! Values come from process environment variables, optionally seeded from a
//! `.env` file. Empty values count as unset.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LOGO_BUCKET: &str = "company-logos";
pub const DEFAULT_LOGO_MAX_SIZE_MB: f64 = 5.0;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Room for request head and framing on top of the largest accepted logo.
pub const UPLOAD_HEADROOM_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection details for the backend-as-a-service project.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub backend: Option<BackendConfig>,
    pub cors_allowed_origins: Vec<String>,
    pub logo_max_size_mb: f64,
    pub logo_bucket: String,
    pub max_request_bytes: usize,
    pub llm_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            openai_api_key: None,
            gemini_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
            backend: None,
            cors_allowed_origins: Vec::new(),
            logo_max_size_mb: DEFAULT_LOGO_MAX_SIZE_MB,
            logo_bucket: DEFAULT_LOGO_BUCKET.to_owned(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn logo_max_bytes(&self) -> usize {
        logo_max_bytes(self.logo_max_size_mb)
    }

    /// Reads the process environment after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let backend = match (get("SUPABASE_URL"), get("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(BackendConfig {
                url: url.trim_end_matches('/').to_owned(),
                anon_key,
            }),
            _ => None,
        };

        let logo_max_size_mb = match get("LOGO_MAX_SIZE_MB") {
            Some(raw) => parse_positive_f64("LOGO_MAX_SIZE_MB", &raw)?,
            None => defaults.logo_max_size_mb,
        };
        let max_request_bytes: usize = match get("MAX_REQUEST_BYTES") {
            Some(raw) => parse_number("MAX_REQUEST_BYTES", &raw)?,
            None => defaults.max_request_bytes,
        };
        // A logo under its own limit must never trip the server cap first.
        let max_request_bytes = max_request_bytes.max(logo_max_bytes(logo_max_size_mb) + UPLOAD_HEADROOM_BYTES);
        let llm_timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("LLM_TIMEOUT_SECS", &raw)?),
            None => defaults.llm_timeout,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            openai_api_key: get("OPENAI_API_KEY"),
            gemini_api_key: get("GEMINI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.openai_base_url),
            gemini_base_url: get("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.gemini_base_url),
            backend,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            logo_max_size_mb,
            logo_bucket: get("LOGO_BUCKET").unwrap_or(defaults.logo_bucket),
            max_request_bytes,
            llm_timeout,
        })
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
        reason: e.to_string(),
    })
}

fn logo_max_bytes(max_size_mb: f64) -> usize {
    (max_size_mb * 1024.0 * 1024.0).ceil() as usize
}

fn parse_positive_f64(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = parse_number(key, raw)?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: raw.to_owned(),
            reason: "must be a positive number".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.openai_api_key.is_none());
        assert!(config.backend.is_none());
        assert!(config.cors_allowed_origins.is_empty());
        assert_eq!(config.logo_max_size_mb, 5.0);
        assert_eq!(config.llm_timeout, Duration::from_secs(60));
    }

    #[test]
    fn values_are_read_and_normalized() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "  g-key  "),
            ("OPENAI_API_KEY", ""),
            ("SUPABASE_URL", "https://proj.example.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example.com, ,https://b.example.com"),
            ("LOGO_MAX_SIZE_MB", "2.5"),
            ("GEMINI_BASE_URL", "http://127.0.0.1:9000/v1beta/"),
        ]))
        .unwrap();

        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.backend.unwrap().url, "https://proj.example.co");
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
        assert_eq!(config.logo_max_size_mb, 2.5);
        assert_eq!(config.gemini_base_url, "http://127.0.0.1:9000/v1beta");
    }

    #[test]
    fn request_cap_always_fits_the_logo_limit() {
        let config = Config::from_lookup(lookup(&[("LOGO_MAX_SIZE_MB", "10")])).unwrap();
        assert_eq!(config.logo_max_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.max_request_bytes, 10 * 1024 * 1024 + UPLOAD_HEADROOM_BYTES);

        let config = Config::from_lookup(lookup(&[("MAX_REQUEST_BYTES", "1024")])).unwrap();
        assert_eq!(config.max_request_bytes, 5 * 1024 * 1024 + UPLOAD_HEADROOM_BYTES);

        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.max_request_bytes, DEFAULT_MAX_REQUEST_BYTES);
    }

    #[test]
    fn backend_needs_both_url_and_key() {
        let config = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://p.example.co")])).unwrap();
        assert!(config.backend.is_none());
    }

    #[test]
    fn invalid_numbers_name_the_key() {
        let err = Config::from_lookup(lookup(&[("LOGO_MAX_SIZE_MB", "-1")])).unwrap_err();
        assert!(err.to_string().contains("LOGO_MAX_SIZE_MB"));

        let err = Config::from_lookup(lookup(&[("MAX_REQUEST_BYTES", "big")])).unwrap_err();
        assert!(err.to_string().contains("MAX_REQUEST_BYTES"));
    }
}
