use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod activity;
pub mod assignments;
pub mod idempotency;
pub mod projects;
pub mod segments;
