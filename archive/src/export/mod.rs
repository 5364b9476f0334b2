//! Chain export service
//!
//! Exports block transactions from a node into an archive sink. A run first
//! catches up on the historical range, then optionally keeps polling the node
//! for new blocks until it is cancelled.

pub mod range;

use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::{
    client::Client,
    config::ExportConfig,
    error::{ArchiveError, Result},
    sink::Sink,
    source::encode_tx_data,
    types::TxData,
};

pub use range::{determine_right_bound, resolve_right_bound};

/// Default interval between watch polls
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Historical export progress after a block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Blocks covered so far, including the current one
    pub blocks_done: u64,

    /// Size of the historical range
    pub total: u64,

    /// Completion percentage
    pub percent: f64,
}

impl Progress {
    /// Progress of a `from..=to` export that just finished `current`
    pub fn new(from: u64, to: u64, current: u64) -> Self {
        let blocks_done = current - from + 1;
        let total = to - from + 1;

        Self {
            blocks_done,
            total,
            percent: blocks_done as f64 / total as f64 * 100.0,
        }
    }
}

/// Last block height handled by the watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WatchState {
    last_observed: u64,
}

impl WatchState {
    /// Blocks to export for a newly observed latest height.
    ///
    /// An unchanged or lower height yields nothing, so no block is ever
    /// exported twice.
    fn pending(&self, latest: u64) -> Option<RangeInclusive<u64>> {
        (latest > self.last_observed).then(|| self.last_observed + 1..=latest)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Cancelled,
}

/// Chain export service
pub struct ExportService<C, S> {
    client: C,
    sink: S,
    watch_interval: Duration,
    span: Span,
}

impl<C, S> ExportService<C, S>
where
    C: Client,
    S: Sink,
{
    /// Create a new export service writing into `sink`
    pub fn new(client: C, sink: S) -> Self {
        Self {
            client,
            sink,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            span: tracing::info_span!("export"),
        }
    }

    /// Set the interval between watch polls
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Record this service's events under the given span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Execute the export.
    ///
    /// Cancellation is checked before every block and every watch poll, and
    /// ends the run successfully with everything exported so far intact.
    pub async fn execute_export(
        &mut self,
        cancel: &CancellationToken,
        cfg: &ExportConfig,
    ) -> Result<()> {
        let span = self.span.clone();
        self.run(cancel, cfg).instrument(span).await
    }

    async fn run(&mut self, cancel: &CancellationToken, cfg: &ExportConfig) -> Result<()> {
        cfg.validate()?;

        let to_block = determine_right_bound(&self.client, cfg.to_block).await?;
        info!(
            from = cfg.from_block,
            to = to_block,
            watch = cfg.watch,
            "Starting export"
        );

        let mut outcome = self.export_history(cancel, cfg.from_block, to_block).await?;

        if outcome == Outcome::Completed && cfg.watch {
            let state = WatchState {
                last_observed: to_block.max(cfg.from_block.saturating_sub(1)),
            };
            outcome = self.watch(cancel, state).await?;
        }

        self.sink.flush().await.map_err(ArchiveError::Flush)?;

        match outcome {
            Outcome::Completed => info!("Export complete"),
            Outcome::Cancelled => info!("Export procedure stopped"),
        }

        Ok(())
    }

    async fn export_history(
        &mut self,
        cancel: &CancellationToken,
        from: u64,
        to: u64,
    ) -> Result<Outcome> {
        for block in from..=to {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let written = self.export_block(block).await?;

            let progress = Progress::new(from, to, block);
            info!(
                block,
                txs = written,
                total = progress.total,
                status = %format!("{:.2}%", progress.percent),
                "Total of {} blocks backed up",
                progress.blocks_done
            );
        }

        Ok(Outcome::Completed)
    }

    async fn watch(
        &mut self,
        cancel: &CancellationToken,
        mut state: WatchState,
    ) -> Result<Outcome> {
        let mut ticker = tokio::time::interval(self.watch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // First tick is immediate

        info!(last_observed = state.last_observed, "Watching for new blocks");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
                _ = ticker.tick() => {}
            }

            let latest = self
                .client
                .get_latest_block_number()
                .await
                .map_err(ArchiveError::LatestHeight)?;

            let Some(pending) = state.pending(latest) else {
                if latest < state.last_observed {
                    warn!(
                        latest,
                        last_observed = state.last_observed,
                        "Latest block height went backwards, waiting for the chain to catch up"
                    );
                }
                continue;
            };

            debug!(
                from = pending.start(),
                to = pending.end(),
                "Catching up to latest block"
            );

            for block in pending {
                if cancel.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }

                self.export_block(block).await?;
                state.last_observed = block;
            }
        }
    }

    /// Fetch one block and append its transactions to the sink.
    ///
    /// Returns the number of records written; empty blocks write nothing.
    async fn export_block(&mut self, height: u64) -> Result<usize> {
        let block = self
            .client
            .get_block_transactions(height)
            .await
            .map_err(|source| ArchiveError::Fetch { height, source })?;

        metrics::increment_counter!("tx_archive_blocks_exported_total");
        metrics::gauge!("tx_archive_export_height", height as f64);

        if block.txs.is_empty() {
            debug!(height, "Skipping empty block");
            return Ok(0);
        }

        let count = block.txs.len();
        for tx in block.txs {
            let data = TxData {
                tx,
                block_num: height,
                timestamp: block.timestamp,
            };

            let line = encode_tx_data(&data)
                .map_err(|source| ArchiveError::Encode { height, source })?;
            self.sink
                .write_all(&line)
                .await
                .map_err(|source| ArchiveError::Write { height, source })?;
        }

        self.sink
            .flush()
            .await
            .map_err(|source| ArchiveError::Write { height, source })?;

        metrics::counter!("tx_archive_txs_exported_total", count as u64);
        Ok(count)
    }
}
