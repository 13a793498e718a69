//! Connection management

mod pool;

pub use pool::{ConnectionPool, PooledSession};

#[cfg(test)]
pub(crate) use pool::tests;
