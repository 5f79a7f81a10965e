use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use parley::{
    credentials::KeyRetrievalStrategy,
    orchestrator::OrchestratorConfig,
    providers::{configs::ProviderConfig, factory::ProviderKind},
};
use serde::Deserialize;

use crate::error::{to_env_var, ConfigError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    #[default]
    Both,
    Environment,
    Keyring,
}

#[derive(Debug, Deserialize)]
pub struct PacingSettings {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_scroll_coalesce_ms")]
    pub scroll_coalesce_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            scroll_coalesce_ms: default_scroll_coalesce_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialSettings {
    #[serde(default)]
    pub source: KeySource,
}

/// Per-backend overrides; anything left out keeps the backend's default
#[derive(Debug, Default, Deserialize)]
pub struct ProviderSettings {
    pub host: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

impl ProviderSettings {
    fn into_config(self, kind: ProviderKind) -> ProviderConfig {
        let mut config = match self.host {
            Some(host) => ProviderConfig::new(host),
            None => ProviderConfig::default_for(kind),
        };
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.idle_timeout_secs {
            config = config.with_idle_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersSettings {
    #[serde(default)]
    pub openrouter: ProviderSettings,
    #[serde(default)]
    pub gemini: ProviderSettings,
    #[serde(default)]
    pub kimi: ProviderSettings,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub pacing: PacingSettings,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub providers: ProvidersSettings,
}

impl Settings {
    /// Load settings from defaults, then the config file, then `PARLEY_*`
    /// environment variables. A model given on the command line wins over all
    /// of them.
    pub fn load(
        config_file: Option<&Path>,
        model_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let default_file = default_config_file();
        let file = config_file.or(default_file.as_deref());

        let mut builder = Config::builder()
            .set_default("pacing.period_ms", default_period_ms())?
            .set_default("pacing.scroll_coalesce_ms", default_scroll_coalesce_ms())?
            .set_default("credentials.source", "both")?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("PARLEY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("model", model_override)?
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `model`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            pacing_period: Duration::from_millis(self.pacing.period_ms),
            scroll_coalesce: Duration::from_millis(self.pacing.scroll_coalesce_ms),
            ..Default::default()
        }
    }

    pub fn key_strategy(&self) -> KeyRetrievalStrategy {
        match self.credentials.source {
            KeySource::Both => KeyRetrievalStrategy::Both,
            KeySource::Environment => KeyRetrievalStrategy::EnvironmentOnly,
            KeySource::Keyring => KeyRetrievalStrategy::KeyringOnly,
        }
    }

    /// Hand the provider sections over to the registry
    pub fn take_provider_configs(&mut self) -> HashMap<ProviderKind, ProviderConfig> {
        let providers = std::mem::take(&mut self.providers);
        HashMap::from([
            (
                ProviderKind::OpenRouter,
                providers.openrouter.into_config(ProviderKind::OpenRouter),
            ),
            (
                ProviderKind::Gemini,
                providers.gemini.into_config(ProviderKind::Gemini),
            ),
            (
                ProviderKind::Kimi,
                providers.kimi.into_config(ProviderKind::Kimi),
            ),
        ])
    }
}

pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
}

fn default_period_ms() -> u64 {
    20
}

fn default_scroll_coalesce_ms() -> u64 {
    30
}
