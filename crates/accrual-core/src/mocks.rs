//! Test doubles for the reconciliation loops.

use accrual_client::{AccrualError, AccrualInterface};
use accrual_storage::implementations::memory::MemoryStorage;
use accrual_storage::{OrderStore, StorageError, StorageOrderStore, StorageService};
use accrual_types::{is_valid_luhn, AccrualOutcome, Order, OrderStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Ordered record of store writes and client calls.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Builds a Luhn-valid order number from a seed.
pub fn order_number(seed: u64) -> String {
	let payload = format!("{:010}", seed);
	(0..10)
		.map(|check| format!("{}{}", payload, check))
		.find(|n| is_valid_luhn(n))
		.unwrap()
}

/// In-memory order store that records every fetch and update.
///
/// Fetches and updates to a chosen status can be switched to fail with a
/// backend error.
pub struct RecordingStore {
	inner: StorageOrderStore,
	log: EventLog,
	fetches: Mutex<Vec<Instant>>,
	fail_fetch: AtomicBool,
	fail_update_to: Mutex<Option<OrderStatus>>,
}

impl RecordingStore {
	pub fn new(log: EventLog) -> Self {
		Self {
			inner: StorageOrderStore::new(Arc::new(StorageService::new(Box::new(
				MemoryStorage::new(),
			)))),
			log,
			fetches: Mutex::new(Vec::new()),
			fail_fetch: AtomicBool::new(false),
			fail_update_to: Mutex::new(None),
		}
	}

	pub fn fail_fetches(&self, fail: bool) {
		self.fail_fetch.store(fail, Ordering::SeqCst);
	}

	/// Makes every update moving an order to `status` fail; `None` clears it.
	pub fn fail_updates_to(&self, status: Option<OrderStatus>) {
		*self.fail_update_to.lock().unwrap() = status;
	}

	/// Registers an order for user 1 and moves it to `status` without logging.
	pub async fn seed(&self, number: &str, status: OrderStatus) {
		self.inner.register_order(number, 1).await.unwrap();
		if status != OrderStatus::New {
			self.inner.update_order(number, status, None).await.unwrap();
		}
	}

	pub fn inner(&self) -> &StorageOrderStore {
		&self.inner
	}

	pub fn fetch_times(&self) -> Vec<Instant> {
		self.fetches.lock().unwrap().clone()
	}

	pub fn updates(&self) -> Vec<String> {
		self.log
			.lock()
			.unwrap()
			.iter()
			.filter(|e| e.starts_with("update"))
			.cloned()
			.collect()
	}
}

#[async_trait]
impl OrderStore for RecordingStore {
	async fn fetch_unresolved(&self) -> Result<Vec<Order>, StorageError> {
		self.fetches.lock().unwrap().push(Instant::now());
		if self.fail_fetch.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("connection lost".into()));
		}
		self.inner.fetch_unresolved().await
	}

	async fn update_order(
		&self,
		number: &str,
		status: OrderStatus,
		accrual: Option<Decimal>,
	) -> Result<u64, StorageError> {
		self.log
			.lock()
			.unwrap()
			.push(format!("update {} {}", number, status));
		let failing = *self.fail_update_to.lock().unwrap();
		if failing == Some(status) {
			return Err(StorageError::Backend("write failed".into()));
		}
		self.inner.update_order(number, status, accrual).await
	}
}

type Script = Box<dyn Fn(usize, &str) -> Result<AccrualOutcome, AccrualError> + Send + Sync>;

/// Accrual client answering from a script indexed by call number.
pub struct ScriptedClient {
	script: Script,
	log: EventLog,
	calls: Mutex<Vec<Instant>>,
}

impl ScriptedClient {
	pub fn new(
		log: EventLog,
		script: impl Fn(usize, &str) -> Result<AccrualOutcome, AccrualError> + Send + Sync + 'static,
	) -> Self {
		Self {
			script: Box::new(script),
			log,
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn call_times(&self) -> Vec<Instant> {
		self.calls.lock().unwrap().clone()
	}
}

#[async_trait]
impl AccrualInterface for ScriptedClient {
	async fn fetch_order_info(&self, number: &str) -> Result<AccrualOutcome, AccrualError> {
		let index = {
			let mut calls = self.calls.lock().unwrap();
			calls.push(Instant::now());
			calls.len() - 1
		};
		self.log.lock().unwrap().push(format!("fetch {}", number));
		(self.script)(index, number)
	}
}
