//! Model index queries

use anyhow::Result;
use opcmap_client::ModelIndexClient;

use crate::output::{ObjectTypeRow, OutputContext};

pub async fn namespaces(client: &ModelIndexClient, ctx: &OutputContext) -> Result<()> {
    let namespaces = client.namespace_array().await?;
    ctx.print_value(&namespaces);
    Ok(())
}

/// Object types cached at connect
pub fn object_types(client: &ModelIndexClient, ctx: &OutputContext) -> Result<()> {
    let rows: Vec<ObjectTypeRow> = client
        .object_types()
        .iter()
        .map(|t| ObjectTypeRow {
            id: t.id.clone(),
            browse_name: t.browse_name.clone(),
            name: t.name.clone().unwrap_or_default(),
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}

/// Objects of a type, by browse name
pub async fn objects(client: &ModelIndexClient, type_name: &str, ctx: &OutputContext) -> Result<()> {
    match client.objects_of_type(type_name).await? {
        Some(objects) => ctx.print_value(&objects),
        None => ctx.warn(&format!("Unknown object type '{}'", type_name)),
    }
    Ok(())
}
