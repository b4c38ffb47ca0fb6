pub mod affinity;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod identity;
pub mod ports;
pub mod quality;
pub mod scoring;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
