use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MongoDB: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON encode: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    #[error("BSON decode: {0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Sequence contains more than one matching document in {0}")]
    MultipleResults(String),

    #[error("text index required for $text query on {0}")]
    TextIndexRequired(String),
}

impl From<toml::de::Error> for SessionError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
