pub mod access;
pub mod activity;
pub mod assignments;
pub mod auth;
pub mod error;
pub mod geometry;
pub mod idempotency;
pub mod identity;
pub mod ports;
pub mod projects;
pub mod segments;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
