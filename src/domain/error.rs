use thiserror::Error;

/// Failure taxonomy of the access and aggregation engine. Storage and
/// transport failures stay in `anyhow` at the boundary; everything the
/// caller can act on is one of these.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("not found")]
    NotFound,
    /// The form content document itself failed to decode or is structurally
    /// broken. Fatal for the object being resolved, never for a sibling row
    /// scanned during aggregation.
    #[error("bad form content: {0}")]
    BadContent(String),
    #[error("forbidden")]
    Forbidden,
    /// Two merges raced on the same record; the caller retries with fresh
    /// data.
    #[error("conflict")]
    Conflict,
    #[error("validation failed: {0}")]
    Validation(String),
}
