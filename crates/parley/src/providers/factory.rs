use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::{
    base::Provider, configs::ProviderConfig, gemini::GeminiProvider, kimi::KimiProvider,
    openrouter::OpenRouterProvider,
};
use crate::credentials::CredentialProvider;
use crate::errors::ProviderResult;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ProviderKind {
    #[strum(to_string = "OpenRouter")]
    OpenRouter,
    #[strum(to_string = "Gemini")]
    Gemini,
    #[strum(to_string = "Kimi")]
    Kimi,
}

impl ProviderKind {
    /// Name the credential provider stores this backend's API key under
    pub fn credential_key(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Kimi => "KIMI_API_KEY",
        }
    }

    pub fn default_host(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => super::openrouter::OPENROUTER_HOST,
            ProviderKind::Gemini => super::gemini::GEMINI_HOST,
            ProviderKind::Kimi => super::kimi::KIMI_HOST,
        }
    }
}

pub fn get_provider(
    kind: ProviderKind,
    config: ProviderConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> ProviderResult<Arc<dyn Provider>> {
    match kind {
        ProviderKind::OpenRouter => Ok(Arc::new(OpenRouterProvider::new(config, credentials)?)),
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(config, credentials)?)),
        ProviderKind::Kimi => Ok(Arc::new(KimiProvider::new(config, credentials)?)),
    }
}

/// One adapter per backend, looked up by the conversation's model
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend, taking per-backend overrides from `configs`
    pub fn with_defaults(
        mut configs: HashMap<ProviderKind, ProviderConfig>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ProviderResult<Self> {
        let mut registry = Self::new();
        for kind in ProviderKind::iter() {
            let config = configs
                .remove(&kind)
                .unwrap_or_else(|| ProviderConfig::default_for(kind));
            registry.register(get_provider(kind, config, credentials.clone())?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).cloned()
    }
}
