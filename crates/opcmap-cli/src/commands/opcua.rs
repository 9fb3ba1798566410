//! Gateway reads: realtime values, aggregated and raw history

use anyhow::Result;
use chrono::{DateTime, Utc};
use opcmap_client::{OpcUaClient, OutputForm};

use super::parse_node_ids;
use crate::output::OutputContext;

/// Read the current value of each node
pub async fn values(client: &OpcUaClient, nodes: &[String], ctx: &OutputContext) -> Result<()> {
    let nodes = parse_node_ids(nodes)?;
    let rows = client.get_values(&nodes).await?;
    ctx.print_table(&opcmap_client::Table::from_rows(&rows));
    Ok(())
}

/// Aggregated history in fixed buckets
pub async fn aggregated(
    client: &OpcUaClient,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_ms: u64,
    aggregate: &str,
    nodes: &[String],
    ctx: &OutputContext,
) -> Result<()> {
    let nodes = parse_node_ids(nodes)?;
    let output = client
        .get_historical_aggregated_values(start, end, interval_ms, aggregate, &nodes, OutputForm::Table)
        .await?;
    ctx.print_table(&output.into_table());
    Ok(())
}

/// Options of the raw command
#[derive(Debug, Clone, Default)]
pub struct RawArgs {
    pub start_index: Option<u64>,
    pub num_records: Option<u64>,
    /// Split the range into windows of this many seconds
    pub window_secs: Option<u64>,
}

/// Raw history, either paged or split into concurrent windows
pub async fn raw(
    client: &OpcUaClient,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    nodes: &[String],
    args: &RawArgs,
    ctx: &OutputContext,
) -> Result<()> {
    let nodes = parse_node_ids(nodes)?;
    let output = match args.window_secs {
        Some(secs) => {
            if args.start_index.is_some() || args.num_records.is_some() {
                ctx.warn("Paging options are ignored for windowed reads");
            }
            let window = chrono::Duration::seconds(i64::try_from(secs)?);
            client
                .get_raw_historical_values_windowed(start, end, &nodes, Some(window), OutputForm::Table)
                .await?
        }
        None => {
            client
                .get_raw_historical_values(
                    start,
                    end,
                    &nodes,
                    args.start_index,
                    args.num_records,
                    OutputForm::Table,
                )
                .await?
        }
    };
    ctx.print_table(&output.into_table());
    Ok(())
}
