//! Shared data models for the gateway, catalog and warehouse clients

mod node_id;
mod table;
mod value;
mod variant;

pub use node_id::*;
pub use table::*;
pub use value::*;
pub use variant::*;
