use thiserror::Error;

use crate::provider::ProviderKind;

#[derive(Debug, Error)]
pub enum RevolverError {
    #[error("unknown {kind} provider passed: {name}")]
    UnknownProvider { kind: ProviderKind, name: String },

    #[error("invalid spec for provider '{provider}': {message}")]
    InvalidSpec { provider: String, message: String },

    #[error("invalid rotation config: {0}")]
    InvalidRotation(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("{0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RevolverError>;
