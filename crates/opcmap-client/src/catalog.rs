//! Model index (address-space catalog) client

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::auth::TokenProvider;
use crate::error::{ClientError, Result};
use crate::session::AuthorizedTransport;
use crate::transport::{HttpTransport, TimeoutProfile};

/// Model index connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the model index REST API
    pub url: String,
}

/// An object type from `query/object-types`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectType {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub browse_name: String,
    /// Any further fields the service returns
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Thin query layer over the model index endpoints.
///
/// Object types are loaded once in [`ModelIndexClient::connect`] and used
/// to resolve human-readable type names to type ids.
#[derive(Debug, Clone)]
pub struct ModelIndexClient {
    http: AuthorizedTransport,
    object_types: Vec<ObjectType>,
}

impl ModelIndexClient {
    /// Connect and cache the object-type list
    pub async fn connect(config: &CatalogConfig, auth: Option<Arc<dyn TokenProvider>>) -> Result<Self> {
        let http = AuthorizedTransport::new(HttpTransport::new(&config.url)?, auth);
        let mut client = Self {
            http,
            object_types: Vec::new(),
        };
        client.object_types = client.fetch_object_types().await?;
        debug!(count = client.object_types.len(), "Loaded object types");
        Ok(client)
    }

    /// `GET query/namespace-array`
    #[instrument(skip(self))]
    pub async fn namespace_array(&self) -> Result<Value> {
        let payload = self
            .http
            .get("query/namespace-array", &[], TimeoutProfile::Normal)
            .await?;
        Ok(payload.into_value())
    }

    /// `GET query/object-types`
    #[instrument(skip(self))]
    pub async fn fetch_object_types(&self) -> Result<Vec<ObjectType>> {
        let payload = self
            .http
            .get("query/object-types", &[], TimeoutProfile::Normal)
            .await?;

        let list = match payload.into_value() {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        serde_json::from_value(list).map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Cached object types
    pub fn object_types(&self) -> &[ObjectType] {
        &self.object_types
    }

    /// Resolve a type name (matched on `BrowseName`) to its id
    pub fn object_type_id(&self, type_name: &str) -> Option<&str> {
        self.object_types
            .iter()
            .find(|t| t.browse_name == type_name)
            .map(|t| t.id.as_str())
    }

    /// `POST query/objects-of-type`; `None` when the type name is unknown
    #[instrument(skip(self))]
    pub async fn objects_of_type(&self, type_name: &str) -> Result<Option<Value>> {
        let Some(type_id) = self.object_type_id(type_name) else {
            return Ok(None);
        };
        let body = json!({ "typeId": type_id });
        let payload = self
            .http
            .post("query/objects-of-type", &body, TimeoutProfile::Normal)
            .await?;
        Ok(Some(payload.into_value()))
    }

    /// `POST query/object-descendants`
    #[instrument(skip(self, object_ids))]
    pub async fn object_descendants(
        &self,
        type_name: &str,
        object_ids: &[String],
        domain: Option<&str>,
    ) -> Result<Option<Value>> {
        self.related_objects("query/object-descendants", type_name, object_ids, domain)
            .await
    }

    /// `POST query/object-ancestors`
    #[instrument(skip(self, object_ids))]
    pub async fn object_ancestors(
        &self,
        type_name: &str,
        object_ids: &[String],
        domain: Option<&str>,
    ) -> Result<Option<Value>> {
        self.related_objects("query/object-ancestors", type_name, object_ids, domain)
            .await
    }

    async fn related_objects(
        &self,
        endpoint: &str,
        type_name: &str,
        object_ids: &[String],
        domain: Option<&str>,
    ) -> Result<Option<Value>> {
        if type_name.is_empty() {
            return Err(ClientError::Validation(
                "Object type name must not be empty".to_string(),
            ));
        }
        if object_ids.is_empty() {
            return Err(ClientError::Validation(
                "Object id list must not be empty".to_string(),
            ));
        }

        let Some(type_id) = self.object_type_id(type_name) else {
            return Ok(None);
        };

        let mut body = json!({ "typeId": type_id, "objectIds": object_ids });
        if let Some(domain) = domain {
            body["domain"] = Value::from(domain);
        }

        let payload = self.http.post(endpoint, &body, TimeoutProfile::Normal).await?;
        Ok(Some(payload.into_value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_keeps_extra_fields() {
        let ty: ObjectType = serde_json::from_value(json!({
            "Id": "13:1:1:Site",
            "Name": "SiteType",
            "BrowseName": "SiteType",
            "Props": [{"DisplayName": "Capacity"}]
        }))
        .unwrap();
        assert_eq!(ty.id, "13:1:1:Site");
        assert_eq!(ty.browse_name, "SiteType");
        assert!(ty.extra.contains_key("Props"));
    }
}
