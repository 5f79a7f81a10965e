use std::collections::HashMap;
use std::env;

use keyring::Entry;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

const KEYRING_SERVICE: &str = "parley";

/// Source of provider API keys.
///
/// Implementations must never log or persist the secrets they hand out.
pub trait CredentialProvider: Send + Sync {
    /// The secret stored under `provider_key`, if there is a non-empty one
    fn get(&self, provider_key: &str) -> Option<String>;
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to access keyring: {0}")]
    KeyringAccess(String),

    #[error("Failed to save to keyring: {0}")]
    KeyringSave(String),

    #[error("Failed to access environment variable: {0}")]
    EnvVarAccess(String),
}

impl From<keyring::Error> for CredentialError {
    fn from(err: keyring::Error) -> Self {
        CredentialError::KeyringAccess(err.to_string())
    }
}

impl From<env::VarError> for CredentialError {
    fn from(err: env::VarError) -> Self {
        CredentialError::EnvVarAccess(err.to_string())
    }
}

#[cfg_attr(test, automock)]
pub trait Keyring: Send + Sync {
    fn get_password(&self, key: &str) -> Result<String, CredentialError>;
    fn set_password(&self, key: &str, password: &str) -> Result<(), CredentialError>;
}

#[cfg_attr(test, automock)]
pub trait Environment: Send + Sync {
    fn get_var(&self, key: &str) -> Result<String, env::VarError>;
}

pub struct RealEnvironment;

impl Environment for RealEnvironment {
    fn get_var(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }
}

/// The platform keychain, one entry per provider key
pub struct SystemKeyring;

impl Keyring for SystemKeyring {
    fn get_password(&self, key: &str) -> Result<String, CredentialError> {
        Ok(Entry::new(KEYRING_SERVICE, key)?.get_password()?)
    }

    fn set_password(&self, key: &str, password: &str) -> Result<(), CredentialError> {
        Entry::new(KEYRING_SERVICE, key)?
            .set_password(password)
            .map_err(|e| CredentialError::KeyringSave(format!("Failed to save key {}: {}", key, e)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyRetrievalStrategy {
    /// Only look in environment variables
    EnvironmentOnly,
    /// Only look in system keyring
    KeyringOnly,
    /// Try keyring first, then environment variables
    #[default]
    Both,
}

/// Looks keys up in the keyring and/or the environment
pub struct KeyStore<K = SystemKeyring, E = RealEnvironment> {
    strategy: KeyRetrievalStrategy,
    keyring: K,
    env: E,
}

impl KeyStore {
    pub fn system(strategy: KeyRetrievalStrategy) -> Self {
        KeyStore::new(strategy, SystemKeyring, RealEnvironment)
    }
}

impl<K: Keyring, E: Environment> KeyStore<K, E> {
    pub fn new(strategy: KeyRetrievalStrategy, keyring: K, env: E) -> Self {
        Self {
            strategy,
            keyring,
            env,
        }
    }

    pub fn get_api_key(&self, key_name: &str) -> Result<String, CredentialError> {
        let key = match self.strategy {
            KeyRetrievalStrategy::EnvironmentOnly => self.env.get_var(key_name)?,
            KeyRetrievalStrategy::KeyringOnly => self.keyring.get_password(key_name)?,
            KeyRetrievalStrategy::Both => match self.keyring.get_password(key_name) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!("Could not retrieve {} from keyring: {}", key_name, e);
                    self.env.get_var(key_name).map_err(|_| {
                        CredentialError::EnvVarAccess(format!(
                            "Could not find {} key in keyring or environment variables",
                            key_name
                        ))
                    })?
                }
            },
        };
        Ok(key)
    }

    pub fn save(&self, key_name: &str, api_key: &str) -> Result<(), CredentialError> {
        self.keyring.set_password(key_name, api_key)
    }
}

impl<K: Keyring, E: Environment> CredentialProvider for KeyStore<K, E> {
    fn get(&self, provider_key: &str) -> Option<String> {
        match self.get_api_key(provider_key) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("No credential for {}: {}", provider_key, e);
                None
            }
        }
    }
}

/// A fixed set of keys, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key<K: Into<String>, V: Into<String>>(mut self, key: K, secret: V) -> Self {
        self.keys.insert(key.into(), secret.into());
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn get(&self, provider_key: &str) -> Option<String> {
        self.keys
            .get(provider_key)
            .filter(|secret| !secret.trim().is_empty())
            .cloned()
    }
}
