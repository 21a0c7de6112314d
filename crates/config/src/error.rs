use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl From<ConfigError> for ragchat_core::Error {
    fn from(err: ConfigError) -> Self {
        ragchat_core::Error::Configuration(err.to_string())
    }
}
