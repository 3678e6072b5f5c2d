//! Core types and trait definitions for the Rubrica evaluation store.
//!
//! This crate holds the declarative taxonomy, the evaluation model and the
//! input validation rules. It has no database dependency; the persisted side
//! lives in `rubrica-store-sqlite`.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod error;
pub mod evaluation;
pub mod ledger;
pub mod plan;
pub mod principal;
pub mod roster;
pub mod sync;
pub mod taxonomy;
pub mod validate;

pub use error::{Error, Result};
