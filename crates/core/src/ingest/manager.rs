use embedded_hal::delay::DelayNs;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ingest_loop::{IngestStats, IngestionLoop};
use super::traits::SourceId;
use crate::register::PinController;

/// Runs every ingestion unit on its own task and stops them together.
pub struct IngestionManager {
    pending: Vec<(SourceId, BoxFuture<'static, IngestStats>)>,
    handles: Vec<(SourceId, JoinHandle<IngestStats>)>,
    cancel: CancellationToken,
    running: bool,
}

impl IngestionManager {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Share an existing token, e.g. one already wired to the interrupt handler.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            pending: Vec::new(),
            handles: Vec::new(),
            cancel,
            running: false,
        }
    }

    /// Register a unit. It starts running on [`start`](Self::start).
    pub fn register_unit<P, D>(&mut self, unit: IngestionLoop<P, D>)
    where
        P: PinController + 'static,
        D: DelayNs + Send + 'static,
    {
        let id = unit.id();
        let cancel = self.cancel.child_token();
        self.pending.push((id, Box::pin(unit.run(cancel))));
    }

    pub fn unit_count(&self) -> usize {
        self.pending.len() + self.handles.len()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Spawn every registered unit.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.running {
            anyhow::bail!("Ingestion manager is already running");
        }

        for (id, unit) in std::mem::take(&mut self.pending) {
            log::debug!("Starting ingestion unit {}", id);
            self.handles.push((id, tokio::spawn(unit)));
        }

        self.running = true;
        Ok(())
    }

    /// Wait for every unit to finish on its own, then collect their stats.
    pub async fn wait(&mut self) -> Vec<(SourceId, IngestStats)> {
        let mut results = Vec::new();
        for (id, handle) in std::mem::take(&mut self.handles) {
            match handle.await {
                Ok(stats) => results.push((id, stats)),
                Err(e) => log::error!("Ingestion unit {} failed: {}", id, e),
            }
        }
        self.running = false;
        results
    }

    /// Cancel every unit and wait for them to stop.
    ///
    /// A unit in the middle of a show finishes that show first.
    pub async fn shutdown(&mut self) -> Vec<(SourceId, IngestStats)> {
        if !self.running {
            return Vec::new();
        }

        log::info!("Shutting down ingestion ...");
        self.cancel.cancel();
        let results = self.wait().await;
        log::info!("Ingestion shutdown complete");
        results
    }
}

impl Default for IngestionManager {
    fn default() -> Self {
        Self::new()
    }
}
