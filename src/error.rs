use thiserror::Error;

use crate::model::Ecosystem;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Resolver error ({ecosystem}): {message}")]
    Resolver { ecosystem: Ecosystem, message: String },

    #[error("Lockfile error ({ecosystem}): {message}")]
    Lockfile { ecosystem: Ecosystem, message: String },

    #[error("Unsupported hash encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Circular dependency detected for package {package} (path: {})", path.join(" -> "))]
    CircularDependency { package: String, path: Vec<String> },

    #[error("Package {package} not found in resolved {ecosystem} dependencies")]
    RootNotResolved { ecosystem: Ecosystem, package: String },

    #[error("Invalid artifact identifier: {0}")]
    InvalidArtifact(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Summary error: {0}")]
    Summary(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuditError {
    /// Build a transport error without an underlying HTTP error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}
