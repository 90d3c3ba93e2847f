use thiserror::Error;

/// Main error type for Harpoon operations
#[derive(Error, Debug)]
pub enum HarpoonError {
    #[error("invalid checksum")]
    InvalidChecksum,

    #[error("unsupported commit version {0}")]
    UnsupportedVersion(u8),

    #[error("found a {found} commit on a {expected} bucket")]
    WrongCommitType { found: String, expected: String },

    #[error("not found")]
    NotFound,

    #[error("query cancelled")]
    Cancelled,

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for Harpoon operations
pub type Result<T> = std::result::Result<T, HarpoonError>;

impl HarpoonError {
    /// Whether the error indicates on-disk or in-flight data damage.
    /// Such errors fail the whole query rather than a single cursor.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            HarpoonError::InvalidChecksum | HarpoonError::Corrupt(_)
        )
    }
}
