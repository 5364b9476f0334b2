//! Archive replay service
//!
//! Reads records from a [`Source`] and resubmits them to a node in archive
//! order. In tail mode the service keeps polling the source for appended
//! records until it is cancelled.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

use crate::{
    client::Client,
    error::{ArchiveError, Result},
    source::Source,
};

/// Default interval between polls of an exhausted source in tail mode
pub const DEFAULT_TAIL_INTERVAL: Duration = Duration::from_secs(1);

/// Archive replay service
pub struct ReplayService<C> {
    client: C,
    poll_interval: Duration,
    span: Span,
    submitted: u64,
}

impl<C: Client> ReplayService<C> {
    /// Create a new replay service
    pub fn new(client: C) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_TAIL_INTERVAL,
            span: tracing::info_span!("replay"),
            submitted: 0,
        }
    }

    /// Set the interval between polls of an exhausted source
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Record this service's events under the given span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Transactions submitted by this service so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Execute the replay.
    ///
    /// Submission failures abort the run. Cancellation ends it successfully.
    pub async fn execute_replay(
        &mut self,
        cancel: &CancellationToken,
        source: &mut dyn Source,
        tail: bool,
    ) -> Result<()> {
        let span = self.span.clone();
        self.run(cancel, source, tail).instrument(span).await
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
        source: &mut dyn Source,
        tail: bool,
    ) -> Result<()> {
        let format = source.format();
        info!(%format, tail, "Starting replay");

        let started_with = self.submitted;

        loop {
            if cancel.is_cancelled() {
                info!(submitted = self.submitted - started_with, "Replay procedure stopped");
                return Ok(());
            }

            if let Some(record) = source.next(cancel).await? {
                self.client
                    .submit_transaction(&record.tx)
                    .await
                    .map_err(ArchiveError::Submit)?;

                self.submitted += 1;
                metrics::increment_counter!("tx_archive_txs_replayed_total");
                debug!(block = ?record.block_num, "Submitted transaction");
                continue;
            }

            // `next` also yields nothing once cancelled
            if cancel.is_cancelled() {
                continue;
            }

            if !tail {
                info!(submitted = self.submitted - started_with, "Replay complete");
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
