//! Periodic loader of unresolved orders.
//!
//! On every tick the poller reads all `NEW` and `PROCESSING` orders and pushes
//! them into the work queue, waiting whenever the queue is full. A pending
//! cooldown is served before the next tick and replaces it.

use crate::{shutdown_requested, sleep_or_shutdown, CooldownListener};
use accrual_storage::OrderStore;
use accrual_types::{truncate_id, Order};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Feeds unresolved orders from storage into the work queue.
pub struct OrderPoller {
	store: Arc<dyn OrderStore>,
	queue: mpsc::Sender<Order>,
	cooldown: CooldownListener,
	interval: Duration,
}

impl OrderPoller {
	pub fn new(
		store: Arc<dyn OrderStore>,
		queue: mpsc::Sender<Order>,
		cooldown: CooldownListener,
		interval: Duration,
	) -> Self {
		Self {
			store,
			queue,
			cooldown,
			interval,
		}
	}

	/// Runs until shutdown is requested or the queue is closed.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		let mut interval = tokio::time::interval(self.interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		tracing::info!(interval_secs = self.interval.as_secs(), "Order poller started");

		loop {
			tokio::select! {
				biased;

				_ = shutdown_requested(&mut shutdown) => break,

				Some(cooldown) = self.cooldown.recv() => {
					tracing::info!(cooldown_secs = cooldown.as_secs(), "Poller cooling down");
					if !sleep_or_shutdown(cooldown, &mut shutdown).await {
						break;
					}
					// The sleep replaces the tick it preempted
					interval.reset();
				}

				_ = interval.tick() => {
					if !self.poll_once(&mut shutdown).await {
						break;
					}
				}
			}
		}

		tracing::info!("Order poller stopped");
	}

	/// Loads unresolved orders and enqueues them.
	///
	/// Returns `false` when the poller should stop.
	async fn poll_once(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
		let orders = match self.store.fetch_unresolved().await {
			Ok(orders) => orders,
			Err(e) => {
				tracing::error!(error = %e, "Failed to fetch unresolved orders");
				return true;
			},
		};

		if !orders.is_empty() {
			tracing::debug!(count = orders.len(), "Enqueueing unresolved orders");
		}

		for order in orders {
			let number = truncate_id(&order.number);
			tokio::select! {
				biased;
				_ = shutdown_requested(shutdown) => return false,
				sent = self.queue.send(order) => {
					if sent.is_err() {
						tracing::warn!(order = %number, "Work queue closed, stopping poller");
						return false;
					}
				}
			}
		}
		true
	}
}
