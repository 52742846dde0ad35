use chatstream_core::chat::Model;
use chatstream_core::secret::ApiKey;
use directories::BaseDirs;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug, Deserialize)]
pub struct OpenAiFileConfig {
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: ApiKey,
    pub base_url: String,
    pub model: Model,
    pub timeout: Duration,
    pub proxy: Option<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<ApiKey>, model: Model, timeout: Duration) -> Self {
        OpenAiConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            timeout,
            proxy: None,
        }
    }

    pub fn from_env_and_file() -> anyhow::Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let mut model = Model::Gpt4;
        let mut timeout_ms = 30_000u64;

        if let Some(path) = Self::config_path() {
            if path.exists() {
                if let Ok(raw) = fs::read_to_string(&path) {
                    if let Ok(file_cfg) = toml::from_str::<OpenAiFileConfig>(&raw) {
                        if let Some(m) = file_cfg.model {
                            model = m.into();
                        }
                        if let Some(t) = file_cfg.timeout_ms {
                            timeout_ms = t;
                        }
                    }
                }
            }
        }

        let proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());

        Ok(OpenAiConfig {
            api_key: ApiKey::new(api_key),
            base_url,
            model,
            timeout: Duration::from_millis(timeout_ms),
            proxy,
        })
    }

    fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".chatstream").join("config.toml")
        } else {
            base.config_dir().join("chatstream").join("config.toml")
        };
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_constructor_uses_upstream_defaults() {
        let cfg = OpenAiConfig::new("sk-test", Model::Gpt4, Duration::from_secs(60));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.model, Model::Gpt4);
        assert_eq!(cfg.timeout, Duration::from_secs(60));
        assert!(cfg.proxy.is_none());
        assert_eq!(cfg.api_key.reveal(), "sk-test");
    }

    #[test]
    fn file_config_accepts_partial_tables() {
        let cfg: OpenAiFileConfig = toml::from_str("model = \"gpt-3.5-turbo\"").unwrap();
        assert_eq!(cfg.model.as_deref(), Some("gpt-3.5-turbo"));
        assert!(cfg.timeout_ms.is_none());
    }
}
