//! Reconciliation engine that wires the poller and the processor together.
//!
//! `start` spawns both loops with a bounded work queue between them and a
//! single-slot cooldown channel from the processor back to the poller, then
//! returns immediately. Orders still in the queue at shutdown are dropped;
//! they remain unresolved in storage and are fetched again after a restart.

use crate::{CooldownSignal, OrderPoller, OrderProcessor};
use accrual_client::AccrualInterface;
use accrual_config::ProcessingConfig;
use accrual_storage::OrderStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Errors that can occur while running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Task error: {0}")]
	Task(String),
}

/// Main reconciliation engine.
#[derive(Clone)]
pub struct ReconciliationEngine {
	store: Arc<dyn OrderStore>,
	client: Arc<dyn AccrualInterface>,
	config: ProcessingConfig,
}

impl ReconciliationEngine {
	pub fn new(
		store: Arc<dyn OrderStore>,
		client: Arc<dyn AccrualInterface>,
		config: ProcessingConfig,
	) -> Self {
		Self {
			store,
			client,
			config,
		}
	}

	/// Launches the poller and the processor.
	///
	/// Both loops stop once `true` is sent on the shutdown channel or its sender is dropped.
	pub fn start(&self, shutdown: watch::Receiver<bool>) -> EngineHandle {
		let capacity = self.config.queue_capacity.max(1);
		let interval = self.config.poll_interval().max(Duration::from_millis(1));

		let (queue_tx, queue_rx) = mpsc::channel(capacity);
		let (notifier, listener) = CooldownSignal::channel();

		let poller = OrderPoller::new(self.store.clone(), queue_tx, listener, interval);
		let processor =
			OrderProcessor::new(self.store.clone(), self.client.clone(), queue_rx, notifier);

		tracing::info!(
			queue_capacity = capacity,
			poll_interval_secs = interval.as_secs(),
			"Starting reconciliation engine"
		);

		EngineHandle {
			poller: tokio::spawn(poller.run(shutdown.clone())),
			processor: tokio::spawn(processor.run(shutdown)),
		}
	}
}

/// Handle to the running engine tasks.
pub struct EngineHandle {
	poller: JoinHandle<()>,
	processor: JoinHandle<()>,
}

impl EngineHandle {
	/// Waits for both loops to finish.
	pub async fn join(self) -> Result<(), EngineError> {
		let (poller, processor) = tokio::join!(self.poller, self.processor);
		poller.map_err(|e| EngineError::Task(format!("Order poller failed: {}", e)))?;
		processor.map_err(|e| EngineError::Task(format!("Order processor failed: {}", e)))?;
		tracing::info!("Reconciliation engine stopped");
		Ok(())
	}
}
