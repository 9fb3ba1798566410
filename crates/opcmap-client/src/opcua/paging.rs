//! Concurrent windowed raw history

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, instrument, warn};

use opcmap_core::{HistoryRow, NodeId, OutputForm, ReadOutput};

use super::read::Limit;
use super::OpcUaClient;
use crate::error::Result;

/// Split `[start, end)` into consecutive windows of at most `window`.
///
/// An empty or inverted range, or a non-positive window, yields the single
/// window `(start, end)`.
pub fn split_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window: chrono::Duration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if start >= end || window <= chrono::Duration::zero() {
        return vec![(start, end)];
    }

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + window).min(end);
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

/// Run `op`, retrying 5xx failures up to `attempts` times with
/// `base * 2^attempt` back-off
pub(crate) async fn retry_server_errors<T, F, Fut>(
    attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_server_error() && attempt < attempts => {
                attempt += 1;
                warn!(attempt, max_attempts = attempts, %e, "Server error, retrying");
                let delay = base.saturating_mul(2u32.saturating_pow(attempt - 1));
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            other => return other,
        }
    }
}

impl OpcUaClient {
    /// Raw history request with the 5xx retry budget applied
    pub(super) async fn raw_history_rows(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        variables: &[NodeId],
        limit: Option<Limit>,
    ) -> Result<Vec<HistoryRow>> {
        let cfg = &self.raw_history;
        retry_server_errors(
            cfg.retry_attempts,
            Duration::from_millis(cfg.retry_base_ms),
            || self.raw_history_request(start, end, variables, limit),
        )
        .await
    }

    /// Raw history over a long range, fetched as concurrent sub-range requests.
    ///
    /// Windows run with at most `max_concurrency` in flight. Rows come back
    /// ordered by the node's position in `variables`, then by timestamp;
    /// points repeated on a window boundary are kept once.
    #[instrument(skip(self, variables), fields(count = variables.len()))]
    pub async fn get_raw_historical_values_windowed(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        variables: &[NodeId],
        window: Option<chrono::Duration>,
        form: OutputForm,
    ) -> Result<ReadOutput<HistoryRow>> {
        let window = window.unwrap_or_else(|| {
            chrono::Duration::seconds(i64::try_from(self.raw_history.window_secs).unwrap_or(i64::MAX))
        });
        let windows = split_windows(start, end, window);
        debug!(windows = windows.len(), "Fetching raw history");

        let pages: Vec<Vec<HistoryRow>> = stream::iter(windows)
            .map(|(from, to)| self.raw_history_rows(from, to, variables, None))
            .buffered(self.raw_history.max_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(ReadOutput::project(merge_windows(pages, variables), form))
    }
}

/// Concatenate per-window pages, grouped by the node's position in
/// `variables`. A row equal to the last row of the same node from the
/// previous window is dropped; repeats inside one window are kept.
fn merge_windows(pages: Vec<Vec<HistoryRow>>, variables: &[NodeId]) -> Vec<HistoryRow> {
    let mut tagged: Vec<(usize, HistoryRow)> = pages
        .into_iter()
        .enumerate()
        .flat_map(|(window, rows)| rows.into_iter().map(move |row| (window, row)))
        .collect();
    tagged.sort_by_key(|(_, row)| {
        variables
            .iter()
            .position(|v| *v == row.node_id)
            .unwrap_or(usize::MAX)
    });

    let mut rows: Vec<HistoryRow> = Vec::with_capacity(tagged.len());
    let mut last_window = None;
    for (window, row) in tagged {
        let boundary_repeat = last_window.is_some_and(|w| w != window)
            && rows.last().is_some_and(|prev| *prev == row);
        last_window = Some(window);
        if !boundary_repeat {
            rows.push(row);
        }
    }
    rows
}
