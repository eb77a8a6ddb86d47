use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, SclError>;

/// Errors raised while loading an SCL document
#[derive(Debug, thiserror::Error)]
pub enum SclError {
    #[error("SCL file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("Undecodable text at byte {position}: {message}")]
    Encoding { position: u64, message: String },

    #[error("Missing element: {0}")]
    MissingElement(String),
}
