use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("AWS {operation} failed: {message}")]
    AwsError { operation: String, message: String },

    #[error("Transport error: {message}")]
    TransportError { message: String },

    #[error("Pagination error: {message}")]
    PaginationError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Startup error: {message}")]
    StartupError { message: String },
}

impl SourceError {
    pub fn aws(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AwsError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    /// 是否為使用者設定錯誤 (而非執行環境問題)
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. }
                | Self::InvalidConfigValueError { .. }
                | Self::MissingConfigError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
