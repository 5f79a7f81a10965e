use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting. Set {env_var} or add it to the config file")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a (dotted) settings field
pub fn to_env_var(field: &str) -> String {
    format!("PARLEY_{}", field.to_uppercase().replace('.', "__"))
}
