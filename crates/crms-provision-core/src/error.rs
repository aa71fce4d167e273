use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid date for {parameter}: '{value}' ({reason})")]
    InvalidDate {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("Missing required column '{column}' in input table")]
    MissingColumn { column: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ProvisionError {
    fn from(e: serde_json::Error) -> Self {
        ProvisionError::SerializationError(e.to_string())
    }
}
