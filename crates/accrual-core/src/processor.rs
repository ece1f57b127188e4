//! Per-order reconciliation against the accrual service.
//!
//! The processor takes one order at a time from the work queue, marks new
//! orders as `PROCESSING`, asks the accrual service for their status and
//! writes back terminal results. Failures on one order are logged and never
//! stop the loop; the order is simply picked up again on a later tick.

use crate::{shutdown_requested, sleep_or_shutdown, CooldownNotifier};
use accrual_client::AccrualInterface;
use accrual_storage::OrderStore;
use accrual_types::{truncate_id, AccrualOrderInfo, AccrualOutcome, Order, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::instrument;

/// Consumes the work queue and reconciles each order.
pub struct OrderProcessor {
	store: Arc<dyn OrderStore>,
	client: Arc<dyn AccrualInterface>,
	queue: mpsc::Receiver<Order>,
	cooldown: CooldownNotifier,
}

impl OrderProcessor {
	pub fn new(
		store: Arc<dyn OrderStore>,
		client: Arc<dyn AccrualInterface>,
		queue: mpsc::Receiver<Order>,
		cooldown: CooldownNotifier,
	) -> Self {
		Self {
			store,
			client,
			queue,
			cooldown,
		}
	}

	/// Runs until shutdown is requested or the poller goes away.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		tracing::info!("Order processor started");

		loop {
			let order = tokio::select! {
				biased;
				_ = shutdown_requested(&mut shutdown) => break,
				order = self.queue.recv() => match order {
					Some(order) => order,
					None => break,
				},
			};

			let Some(cooldown) = self.process(order, &mut shutdown).await else {
				continue;
			};

			// Slow the poller down too; one pending cooldown is enough
			self.cooldown.notify(cooldown);
			tracing::info!(cooldown_secs = cooldown.as_secs(), "Processor cooling down");
			if !sleep_or_shutdown(cooldown, &mut shutdown).await {
				break;
			}
		}

		tracing::info!("Order processor stopped");
	}

	/// Reconciles a single order and returns the cooldown requested by the service, if any.
	#[instrument(skip_all, fields(order = %truncate_id(&order.number)))]
	async fn process(
		&self,
		order: Order,
		shutdown: &mut watch::Receiver<bool>,
	) -> Option<Duration> {
		if order.status == OrderStatus::New {
			match self
				.store
				.update_order(&order.number, OrderStatus::Processing, None)
				.await
			{
				Ok(0) => {
					// Gone, or an earlier copy from the queue already handled it
					tracing::debug!("Order already moved past NEW, skipping lookup");
					return None;
				},
				Ok(_) => tracing::debug!("Order marked as processing"),
				Err(e) => {
					tracing::error!(error = %e, "Failed to mark order as processing");
					return None;
				},
			}
		}

		// Nothing has been written for this lookup yet, so it can be abandoned
		let outcome = tokio::select! {
			biased;
			_ = shutdown_requested(shutdown) => return None,
			outcome = self.client.fetch_order_info(&order.number) => outcome,
		};

		match outcome {
			Ok(AccrualOutcome::Resolved(info)) => {
				self.apply(&order, info).await;
				None
			},
			Ok(AccrualOutcome::Unknown) => {
				tracing::info!("Order not yet registered in the accrual service");
				None
			},
			Ok(AccrualOutcome::RateLimited { cooldown, max_rpm }) => {
				tracing::warn!(
					cooldown_secs = cooldown.as_secs(),
					max_rpm,
					"Accrual service rate limit reached"
				);
				Some(cooldown)
			},
			Ok(AccrualOutcome::TransientError { attempts, reason }) => {
				tracing::warn!(attempts, reason = %reason, "Accrual service unavailable, will retry next cycle");
				None
			},
			Err(e) => {
				tracing::error!(error = %e, "Accrual lookup failed");
				None
			},
		}
	}

	/// Persists a resolved status when it is terminal.
	async fn apply(&self, order: &Order, info: AccrualOrderInfo) {
		let status = OrderStatus::from(info.status);
		if !status.is_terminal() {
			tracing::debug!(%status, "Accrual still in progress");
			return;
		}

		let accrual = match status {
			OrderStatus::Processed => info.accrual,
			_ => None,
		};

		match self.store.update_order(&order.number, status, accrual).await {
			Ok(0) => tracing::debug!(%status, "Order already resolved"),
			Ok(_) => tracing::info!(%status, accrual = ?accrual, "Order resolved"),
			Err(e) => tracing::error!(%status, error = %e, "Failed to persist accrual result"),
		}
	}
}
