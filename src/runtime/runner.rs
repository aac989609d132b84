use crate::harvest::harvester::{Harvester, HarvesterServices, RunSummary};
use crate::harvest::resolver::ChainSource;
use crate::index::gateway::PayloadStore;
use crate::runtime::config::HarvestConfig;
use crate::runtime::telemetry::Telemetry;
use crate::AttestationIndex;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates the harvester lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner<C, I, P>
where
    C: ChainSource + 'static,
    I: AttestationIndex + 'static,
    P: PayloadStore + 'static,
{
    harvester: Harvester<C, I, P>,
    shutdown: CancellationToken,
}

impl<C, I, P> Runner<C, I, P>
where
    C: ChainSource + 'static,
    I: AttestationIndex + 'static,
    P: PayloadStore + 'static,
{
    /// Creates a new runner and wires a root [`CancellationToken`] that the
    /// harvester checks between tasks and batches.
    pub fn new(config: HarvestConfig, services: HarvesterServices<C, I, P>) -> Self {
        Self {
            harvester: Harvester::new(config, services),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.harvester.telemetry()
    }

    /// Runs the harvest to completion, honoring only external cancellation of
    /// the root token.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let shutdown = self.shutdown.clone();
        self.harvester.run(&shutdown).await
    }

    /// Runs the harvest until it finishes or a Ctrl-C (SIGINT) is received.
    /// Interruption is not an error: the returned summary reports
    /// `completed: false` and everything flushed so far stays on disk.
    pub async fn run_until_ctrl_c(&mut self) -> Result<RunSummary> {
        let signal_shutdown = self.shutdown.clone();
        let signal_listener = tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if let Err(err) = result {
                        tracing::error!(error = %err, "failed to listen for Ctrl-C");
                    } else {
                        tracing::info!("Ctrl-C received; finishing current batch boundary");
                    }
                    signal_shutdown.cancel();
                }
                _ = signal_shutdown.cancelled() => {}
            }
        });

        let shutdown = self.shutdown.clone();
        let outcome = self.harvester.run(&shutdown).await;

        // Release the listener whether the run completed or was interrupted.
        self.shutdown.cancel();
        let _ = signal_listener.await;
        self.shutdown = CancellationToken::new();

        outcome
    }
}
