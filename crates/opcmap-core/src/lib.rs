//! opcmap-core - Shared types for the OPC UA gateway and warehouse clients
//!
//! This crate holds the value objects that cross every client boundary:
//! node identifiers, the built-in variant type table, typed values, flat
//! read rows and the tabular projection used when a caller asks for a
//! table instead of a list of rows.

pub mod error;
pub mod models;

pub use error::{CoreError, CoreResult};
pub use models::*;
