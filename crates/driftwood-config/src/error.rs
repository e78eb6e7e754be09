use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Config file not found. Looked in:\n\
        - current directory: driftwood.local.yaml, driftwood.yaml\n\
        - ./.driftwood/driftwood.yaml\n\
        - ~/.config/driftwood/driftwood.yaml\n\
        Set DRIFTWOOD_CONFIG to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
