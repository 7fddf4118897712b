//! Error types for slimify-core.

/// Result type for slimify-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in slimify-core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store could not be opened, read, or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// The database was written by a newer schema than this build understands.
    #[error("Schema mismatch: database is at version {found}, this build supports up to {supported}")]
    SchemaMismatch { found: i64, supported: i64 },

    /// A stored record could not be decoded.
    #[error("Corrupt record in {collection}: {source}")]
    Corrupt {
        collection: &'static str,
        source: serde_json::Error,
    },

    /// A record could not be encoded for storage.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No AI provider credentials are configured.
    #[error("AI service not configured")]
    AiNotConfigured,

    /// The AI provider could not be reached or answered with a failure status.
    #[error("AI request failed: {0}")]
    AiRequest(String),

    /// The AI provider answered, but not with the expected payload.
    #[error("Failed to parse AI response: {0}")]
    AiResponseMalformed(String),

    /// Input rejected before reaching storage.
    #[error("{0}")]
    Validation(String),
}

impl Error {
    /// Whether this error came from the AI collaborator rather than local state.
    #[must_use]
    pub fn is_ai(&self) -> bool {
        matches!(
            self,
            Self::AiNotConfigured | Self::AiRequest(_) | Self::AiResponseMalformed(_)
        )
    }
}
