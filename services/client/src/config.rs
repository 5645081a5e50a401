use serde::Deserialize;
use std::path::PathBuf;

/// Client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Directory for persisted tokens; memory only when unset
    pub token_dir: Option<PathBuf>,
}

fn default_api_url() -> String {
    "http://localhost:3001/".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment
    /// (`CASADIN_CLIENT__API_URL`, `CASADIN_CLIENT__TOKEN_DIR`)
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CASADIN_CLIENT")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}
