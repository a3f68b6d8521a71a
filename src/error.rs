use thiserror::Error;

use crate::taxonomy::TaxonomyError;

/// Infrastructure failures raised by a `RecordStore`. The engine passes these
/// through untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to decode stored record: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum GrowthError {
    #[error("invalid timeframe '{0}', expected one of: week, month, term, year")]
    InvalidTimeframe(String),

    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("rubric dimension '{dimension}' has no skill category mapping")]
    DataIntegrity { dimension: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GrowthError {
    /// HTTP status the API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidTimeframe(_) => 400,
            Self::StudentNotFound(_) => 404,
            Self::DataIntegrity { .. } | Self::Store(_) => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid skill taxonomy: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("invalid threshold: {0}")]
    Threshold(String),
}
