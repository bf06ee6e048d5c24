use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The model definition is inconsistent: bad dimensions, values outside
    /// `[0, 1]`, rows that do not sum to one, or duplicated names.
    #[error("invalid model: {0}")]
    InvalidModel(String),
    /// The observation sequence is empty or refers to an unknown symbol.
    #[error("invalid observation: {0}")]
    InvalidObservation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    BsonDe(#[from] bson::de::Error),
    #[error(transparent)]
    BsonSer(#[from] bson::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
