//! Command implementations for opcmap

pub mod catalog;
pub mod dwh;
pub mod opcua;

pub use catalog::{namespaces, object_types, objects};
pub use dwh::{plants, version, ForecastProvider};
pub use opcua::{aggregated, raw, values, RawArgs};

use anyhow::{bail, Context, Result};
use opcmap_client::{IdType, NodeId};

/// Parse a node in OPC UA text notation: `ns=2;s=Pump.Speed`, `ns=0;i=2258`,
/// `g=<guid>`, `b=<opaque>`. The namespace defaults to 0.
pub fn parse_node_id(text: &str) -> Result<NodeId> {
    let (namespace, ident) = match text.split_once(';') {
        Some((ns, rest)) => {
            let ns = ns
                .strip_prefix("ns=")
                .with_context(|| format!("Invalid node id '{}': expected ns=<n>;", text))?;
            let ns: u32 = ns
                .parse()
                .with_context(|| format!("Invalid namespace in node id '{}'", text))?;
            (ns, rest)
        }
        None => (0, text),
    };

    let Some((kind, id)) = ident.split_once('=') else {
        bail!("Invalid node id '{}': expected i=, s=, g= or b=", text);
    };
    let id_type = match kind {
        "i" => IdType::Numeric,
        "s" => IdType::String,
        "g" => IdType::Guid,
        "b" => IdType::Opaque,
        other => bail!("Invalid node id '{}': unknown identifier kind '{}'", text, other),
    };
    if id.is_empty() {
        bail!("Invalid node id '{}': empty identifier", text);
    }
    if id_type == IdType::Numeric && id.parse::<u64>().is_err() {
        bail!("Invalid node id '{}': numeric identifier expected", text);
    }
    Ok(NodeId::new(id, namespace, id_type))
}

/// Parse every node argument
pub fn parse_node_ids(args: &[String]) -> Result<Vec<NodeId>> {
    args.iter().map(|a| parse_node_id(a)).collect()
}
