use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid file id: {0}")]
    InvalidFileId(String),

    #[error("Invalid ttl: {0}")]
    InvalidTtl(String),

    #[error("{url}: {message}")]
    Remote { url: String, message: String },

    #[error("{url}: unexpected status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("No directory seeds configured")]
    NoSeeds,

    #[error("Volume lookup failed:\n{0}")]
    BatchLookup(String),

    #[error("Session {0} is poisoned by an earlier write failure")]
    SessionPoisoned(String),

    #[error("Not all chunks deleted: {failed} of {total} failed")]
    ChunkCleanup { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, WeedError>;
