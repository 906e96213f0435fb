use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("{function}: field '{field}' is missing in '{key}'")]
    MissingField {
        function: &'static str,
        field: String,
        key: String,
    },

    #[error("{function}: {reason}")]
    InvalidInput {
        function: &'static str,
        reason: String,
    },

    #[error("invalid definition: {0}")]
    Definition(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("stat '{stat}': {source}")]
    Stat {
        stat: String,
        #[source]
        source: Box<NormalizeError>,
    },

    #[error("failed to parse properties: {0}")]
    Properties(#[from] serde_json::Error),
}

impl From<NormalizeError> for teleflow_core::TeleflowError {
    fn from(e: NormalizeError) -> Self {
        Self::Normalize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
