//! Core reconciliation engine for the accrual system.
//!
//! Two long-lived tasks cooperate through a bounded queue: the `OrderPoller`
//! periodically loads unresolved orders from storage, and the `OrderProcessor`
//! asks the accrual service about each one and persists the answer. When the
//! accrual service rate-limits us, the processor pauses itself and signals the
//! poller through a single-slot cooldown channel.

pub mod builder;
pub mod cooldown;
pub mod engine;
pub mod poller;
pub mod processor;

#[cfg(test)]
mod mocks;

pub use builder::{BuilderError, EngineBuilder, EngineFactories};
pub use cooldown::{CooldownListener, CooldownNotifier, CooldownSignal};
pub use engine::{EngineError, EngineHandle, ReconciliationEngine};
pub use poller::OrderPoller;
pub use processor::OrderProcessor;

use std::time::Duration;
use tokio::sync::watch;

/// Resolves once shutdown has been requested.
///
/// A dropped sender counts as a shutdown request.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleeps for `duration` unless shutdown is requested first.
///
/// Returns `false` when the sleep was cut short by shutdown.
pub(crate) async fn sleep_or_shutdown(
	duration: Duration,
	shutdown: &mut watch::Receiver<bool>,
) -> bool {
	tokio::select! {
		biased;
		_ = shutdown_requested(shutdown) => false,
		_ = tokio::time::sleep(duration) => true,
	}
}
