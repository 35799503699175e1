//! Execution-engine adapter

pub mod client;

pub use client::{HttpExecutor, Privacy, SqlExecutor};

#[cfg(test)]
pub use client::MockSqlExecutor;
