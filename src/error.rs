use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("more than 254 users")]
    CapacityExhausted,

    #[error("external command failed: {0}")]
    ExternalPrimitive(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RegistryError::Validation(msg.into())
    }

    /// Stable short name used at the CLI boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Validation(_) => "validation",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::CapacityExhausted => "capacity_exhausted",
            RegistryError::ExternalPrimitive(_) => "external_primitive",
            RegistryError::Storage(_) => "storage",
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(e: std::io::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} cannot be empty")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("server key generation failed: {0}")]
    Keygen(String),
}
