use std::time::Duration;

use headshot_common::{HeadshotError, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads `GEMINI_API_KEY`, `HEADSHOT_GEMINI_MODEL`,
    /// `HEADSHOT_GEMINI_ENDPOINT` and `HEADSHOT_GEMINI_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = var("GEMINI_API_KEY").ok_or_else(|| {
            HeadshotError::InvalidArgument("GEMINI_API_KEY is not set".to_string())
        })?;
        let mut config = Self::new(api_key);

        if let Some(model) = var("HEADSHOT_GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(endpoint) = var("HEADSHOT_GEMINI_ENDPOINT") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(secs) = var("HEADSHOT_GEMINI_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                HeadshotError::InvalidArgument(format!(
                    "HEADSHOT_GEMINI_TIMEOUT_SECS must be a whole number of seconds, got {secs}"
                ))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}
