use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("No such method: {0}")]
    NoSuchMethod(String),

    #[error("Validation failed for `{path}`: {message}")]
    Validation { path: String, message: String },

    #[error("Cast error: {0}")]
    Cast(String),

    #[error("Invalid query chain: {0}")]
    InvalidChain(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

impl DbError {
    pub(crate) fn validation(path: &str, message: impl Into<String>) -> Self {
        Self::Validation { path: path.to_string(), message: message.into() }
    }
}

impl From<toml::de::Error> for DbError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
