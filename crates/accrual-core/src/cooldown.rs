//! Single-slot cooldown signal between the processor and the poller.
//!
//! At most one cooldown is pending at a time. Notifying while one is already
//! pending drops the new duration: one effective pause is enough.

use std::time::Duration;
use tokio::sync::mpsc;

/// Factory for a connected notifier and listener pair.
pub struct CooldownSignal;

impl CooldownSignal {
	pub fn channel() -> (CooldownNotifier, CooldownListener) {
		let (tx, rx) = mpsc::channel(1);
		(CooldownNotifier { tx }, CooldownListener { rx })
	}
}

/// Sending half, held by the processor.
#[derive(Debug, Clone)]
pub struct CooldownNotifier {
	tx: mpsc::Sender<Duration>,
}

impl CooldownNotifier {
	/// Publishes a cooldown without waiting.
	///
	/// Returns `false` if a cooldown is already pending or the listener is gone.
	pub fn notify(&self, cooldown: Duration) -> bool {
		match self.tx.try_send(cooldown) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(_)) => {
				tracing::debug!(
					cooldown_secs = cooldown.as_secs(),
					"Cooldown already pending, dropping signal"
				);
				false
			},
			Err(mpsc::error::TrySendError::Closed(_)) => false,
		}
	}
}

/// Receiving half, held by the poller.
#[derive(Debug)]
pub struct CooldownListener {
	rx: mpsc::Receiver<Duration>,
}

impl CooldownListener {
	/// Waits for the next cooldown. Returns `None` once every notifier is dropped.
	pub async fn recv(&mut self) -> Option<Duration> {
		self.rx.recv().await
	}

	/// Takes the pending cooldown, if any.
	pub fn try_recv(&mut self) -> Option<Duration> {
		self.rx.try_recv().ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_second_signal_dropped_while_pending() {
		let (notifier, mut listener) = CooldownSignal::channel();

		assert!(notifier.notify(Duration::from_secs(60)));
		assert!(!notifier.notify(Duration::from_secs(30)));

		assert_eq!(listener.try_recv(), Some(Duration::from_secs(60)));
		assert_eq!(listener.try_recv(), None);

		// Slot is free again once consumed
		assert!(notifier.clone().notify(Duration::from_secs(5)));
		assert_eq!(listener.try_recv(), Some(Duration::from_secs(5)));
	}

	#[test]
	fn test_notify_without_listener() {
		let (notifier, listener) = CooldownSignal::channel();
		drop(listener);
		assert!(!notifier.notify(Duration::from_secs(1)));
	}
}
