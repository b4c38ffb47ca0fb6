use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("transient source failure: {0}")]
    TransientSource(String),
    #[error("aggregation run already in progress: {0}")]
    AggregationConflict(String),
    #[error("no content source available: {0}")]
    Unavailable(String),
}
