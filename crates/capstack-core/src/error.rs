use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapstackError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Cap table validation failed for '{security}': {reason}")]
    CapTable { security: String, reason: String },

    #[error("Unknown security id '{0}'")]
    UnknownSecurity(String),

    #[error("Negative tranche value {value} for the interval starting at {from_value}")]
    NegativeTranche { from_value: Decimal, value: Decimal },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CapstackError {
    fn from(e: serde_json::Error) -> Self {
        CapstackError::SerializationError(e.to_string())
    }
}
