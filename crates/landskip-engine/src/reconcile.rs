//! The reconciliation loop: one-shot or periodic

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::apply::Applier;
use crate::error::Result;
use crate::state::StateSource;

/// How the reconciler runs
#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    pub dry_run: bool,
    /// `None` runs a single tick; `Some` keeps converging at this interval
    pub interval: Option<Duration>,
}

/// Converges the current state toward the desired state, one tick at a
/// time. Each tick re-queries both state sources; nothing is carried
/// across ticks besides what the cluster itself records.
pub struct Reconciler {
    desired: Box<dyn StateSource>,
    current: Box<dyn StateSource>,
    applier: Applier,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        desired: Box<dyn StateSource>,
        current: Box<dyn StateSource>,
        applier: Applier,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            desired,
            current,
            applier,
            config,
        }
    }

    /// Run until done (one-shot) or cancelled (periodic).
    ///
    /// In periodic mode a failing tick is logged and the loop continues;
    /// cancellation interrupts the sleep and never an in-flight tick.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let Some(interval) = self.config.interval else {
            return self.tick().await;
        };

        loop {
            if cancel.is_cancelled() {
                info!("reconcile loop cancelled");
                return Ok(());
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "reconcile tick failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reconcile loop cancelled");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One reconciliation tick: load both states, apply the difference
    pub async fn tick(&self) -> Result<()> {
        let desired = self.desired.components().await?;
        let current = self.current.components().await?;

        self.applier.apply(&desired, &current).await?;

        if self.config.dry_run {
            warn!("dry-run: no actual actions performed");
        }
        Ok(())
    }
}
