use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod candidates;
pub mod events;
pub mod follows;
pub mod locks;
pub mod scores;
pub mod supplement;
