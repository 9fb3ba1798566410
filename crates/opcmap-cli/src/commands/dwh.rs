//! Data warehouse commands

use anyhow::{Context, Result};
use clap::ValueEnum;
use opcmap_dwh::{create_environment, Dwh, Record, Table};

use crate::config::DwhSection;
use crate::output::{format_cell, OutputContext};

/// Forecast provider whose plant list to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForecastProvider {
    Enercast,
    Solcast,
}

/// The manager is blocking; keep it off the async workers
async fn with_dwh<T, F>(section: DwhSection, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Dwh) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let env = create_environment(section.backend)?;
        let dwh = Dwh::connect(section.connection, env)
            .context("Failed to connect to the data warehouse")?;
        f(&dwh)
    })
    .await?
}

/// Print the schema version record
pub async fn version(section: DwhSection, ctx: &OutputContext) -> Result<()> {
    let record = with_dwh(section, |dwh| Ok(dwh.version()?)).await?;
    if record.is_empty() {
        ctx.warn("No version information returned");
        return Ok(());
    }
    let pairs: Vec<(String, String)> = record
        .iter()
        .map(|(k, v)| (k.clone(), format_cell(v)))
        .collect();
    ctx.print_kv(&pairs);
    Ok(())
}

/// Plants due for a forecast update
pub async fn plants(
    section: DwhSection,
    provider: ForecastProvider,
    ctx: &OutputContext,
) -> Result<()> {
    let records: Vec<Record> = with_dwh(section, move |dwh| {
        let records = match provider {
            ForecastProvider::Enercast => dwh.enercast.get_plants_to_update()?,
            ForecastProvider::Solcast => dwh.solcast.get_plants_to_update()?,
        };
        Ok(records)
    })
    .await?;
    ctx.print_table(&Table::from_records(&records));
    Ok(())
}
