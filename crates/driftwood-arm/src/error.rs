//! ARM client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArmError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(#[from] driftwood_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ArmError>;
