//! SQLite backend for the Rubrica evaluation store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write path opens its own
//! transaction inside one `call`, so a failure anywhere rolls the whole unit
//! back when the transaction handle is dropped.

mod audit;
mod encode;
mod ledger;
mod schema;
mod store;
mod sync;
mod verify;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
