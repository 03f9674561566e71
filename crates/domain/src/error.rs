use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
