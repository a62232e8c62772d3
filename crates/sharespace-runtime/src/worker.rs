//! Turn worker
//!
//! Runs the orchestrator on a tokio interval. Handler tasks push inbound
//! messages through an unbounded channel; each tick drains them, runs one
//! turn and forwards everything the turn produced.

use std::sync::Arc;

use parking_lot::RwLock;
use sharespace_core::{AreaPartitioner, Turn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{ConflictOrchestrator, Inbound, OrchestratorConfig, OrchestratorStats, Outbound, TurnOutcome};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Orchestrator task has stopped")]
    Stopped,

    #[error("Orchestrator task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Connection to a running orchestrator task
pub struct OrchestratorHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    stats: Arc<RwLock<OrchestratorStats>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Sender for handler tasks
    pub fn sender(&self) -> mpsc::UnboundedSender<Inbound> {
        self.inbound.clone()
    }

    pub fn send(&self, message: Inbound) -> Result<(), WorkerError> {
        self.inbound.send(message).map_err(|_| WorkerError::Stopped)
    }

    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Snapshot of the latest turn statistics
    pub fn stats(&self) -> OrchestratorStats {
        self.stats.read().clone()
    }

    /// Stop after the current turn and wait for the task
    pub async fn shutdown(mut self) -> Result<(), WorkerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await?;
        Ok(())
    }
}

/// Spawn the orchestrator on the current tokio runtime
pub fn spawn_orchestrator(config: OrchestratorConfig, partitioner: Arc<dyn AreaPartitioner>) -> OrchestratorHandle {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let stats = Arc::new(RwLock::new(OrchestratorStats::default()));

    let orchestrator = ConflictOrchestrator::new(config, partitioner);
    let task = tokio::spawn(run_orchestrator(orchestrator, inbound_rx, outbound_tx, stats.clone(), shutdown_rx));

    OrchestratorHandle {
        inbound: inbound_tx,
        outbound: outbound_rx,
        stats,
        shutdown: Some(shutdown_tx),
        task,
    }
}

async fn run_orchestrator(
    mut orchestrator: ConflictOrchestrator,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Outbound>,
    stats: Arc<RwLock<OrchestratorStats>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let clock = orchestrator.clock();
    let mut interval = tokio::time::interval(clock.turn_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let epoch = Instant::now();

    info!(turn_ms = clock.turn_ms(), "orchestrator started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now: Turn = clock.turn_at_seconds(epoch.elapsed().as_secs_f64());
                while let Ok(message) = inbound.try_recv() {
                    orchestrator.handle(message, now);
                }

                let outcome = orchestrator.run_turn(now);
                if let TurnOutcome::Transitioned { transition, state_id } = &outcome {
                    debug!(turn = now, %transition, %state_id, "turn done");
                }

                for message in orchestrator.drain_outbound() {
                    if outbound.send(message).is_err() {
                        debug!("outbound receiver dropped");
                        break;
                    }
                }
                *stats.write() = orchestrator.stats().clone();
            }
            _ = &mut shutdown => {
                info!(turns = orchestrator.stats().turns, "orchestrator shutting down");
                break;
            }
        }
    }
}
