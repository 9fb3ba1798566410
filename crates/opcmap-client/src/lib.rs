//! REST clients for an OPC UA gateway, its model index and the identity
//! provider guarding both.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opcmap_client::{AuthClient, AuthConfig, NodeId, OpcUaClient, OpcUaConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = Arc::new(AuthClient::new(AuthConfig {
//!         base_url: "https://idp.example.com".into(),
//!         username: "operator".into(),
//!         password: "secret".into(),
//!     })?);
//!
//!     let client = OpcUaClient::new(OpcUaConfig::new(
//!         "https://gateway.example.com/api",
//!         "opc.tcp://plc.example.com:4840",
//!     ))?
//!     .with_auth(auth);
//!
//!     let values = client.get_values(&[NodeId::string("Site.Power", 2)]).await?;
//!     println!("{:?}", values);
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module serves an axum router on an ephemeral port:
//!
//! ```rust,ignore
//! use opcmap_client::testing::TestServer;
//!
//! let server = TestServer::start(router).await?;
//! let client = OpcUaClient::new(OpcUaConfig::new(server.base_url(), "opc.tcp://plc:4840"))?;
//! ```

pub mod auth;
pub mod catalog;
mod error;
pub mod opcua;
pub mod session;
pub mod testing;
pub mod transport;

pub use auth::{AuthClient, AuthConfig, AuthSession, TokenProvider};
pub use catalog::{CatalogConfig, ModelIndexClient, ObjectType};
pub use error::{ClientError, Result};
pub use opcua::{
    HistoricalWriteRequest, HistoricalWriteResult, Limit, OpcUaClient, OpcUaConfig,
    PerformInsertReplace, RawHistoryConfig, WriteError, WriteResult, WriteVariable,
};
pub use transport::{HttpTransport, Payload, TimeoutProfile};

// Re-export core types for convenience
pub use opcmap_core::{
    type_info, HistoryPoint, HistoryRow, IdType, LiveValue, NodeId, OutputForm, ReadOutput,
    StatusCode, Table, TableRow, TypeInfo, Variant, VariantBody, VariantType,
};
