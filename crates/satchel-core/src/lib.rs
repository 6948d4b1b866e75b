//! Core types and trait definitions for the satchel document store.
//!
//! This crate is deliberately free of database-driver dependencies. The
//! engine (`satchel-store`) and every backend crate depend on it; it depends
//! only on the serialization stack.

// Native `async fn` in traits is fine here: the engine is generic over the
// backend, never trait-object based. Suppress the advisory `Send` lint.
#![allow(async_fn_in_trait)]

pub mod change;
pub mod container;
pub mod dialect;
pub mod diff;
pub mod document;
pub mod error;
pub mod event;
pub mod params;
pub mod parser;
pub mod path;
pub mod prune;
pub mod query;
pub mod time;
pub mod value;

pub use error::{Error, Result};
