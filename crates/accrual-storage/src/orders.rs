//! Order persistence for the reconciliation engine.
//!
//! `OrderStore` is the contract the engine consumes. `StorageOrderStore`
//! implements it on top of any `StorageService` backend, serializing every
//! order and balance mutation through a single lock. Balances record which
//! orders and withdrawals they already include, so a write sequence cut short
//! by a backend failure can be replayed without counting anything twice.

use crate::{StorageError, StorageService};
use accrual_types::{is_valid_luhn, Order, OrderStatus, StorageKey, UserBalance, Withdrawal};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage contract for orders awaiting reconciliation.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Returns every order whose status is `NEW` or `PROCESSING`, oldest first.
	async fn fetch_unresolved(&self) -> Result<Vec<Order>, StorageError>;

	/// Applies a partial update to an order and returns the number of rows affected.
	///
	/// Returns `Ok(0)` when the order does not exist or the status change would move
	/// backwards. When the order becomes `PROCESSED` with a positive accrual, the
	/// owner's balance is credited as part of the same update, at most once per order.
	async fn update_order(
		&self,
		number: &str,
		status: OrderStatus,
		accrual: Option<Decimal>,
	) -> Result<u64, StorageError>;
}

fn sort_oldest_first(orders: &mut [Order]) {
	orders.sort_by(|a, b| {
		a.uploaded_at
			.cmp(&b.uploaded_at)
			.then_with(|| a.number.cmp(&b.number))
	});
}

/// `OrderStore` backed by a key-value `StorageService`.
pub struct StorageOrderStore {
	storage: Arc<StorageService>,
	/// Serializes read-modify-write cycles on orders and balances.
	write_lock: Mutex<()>,
}

impl StorageOrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			write_lock: Mutex::new(()),
		}
	}

	/// Registers a newly submitted order in the `NEW` status.
	///
	/// Fails when the number does not pass the Luhn check or was already uploaded.
	pub async fn register_order(&self, number: &str, user_id: u64) -> Result<Order, StorageError> {
		if !is_valid_luhn(number) {
			return Err(StorageError::InvalidOrderNumber(number.to_string()));
		}

		let _guard = self.write_lock.lock().await;
		match self.load_order(number).await? {
			Some(existing) if existing.user_id == user_id => {
				Err(StorageError::OrderAlreadyUploaded(number.to_string()))
			},
			Some(_) => Err(StorageError::OrderOwnedByAnotherUser(number.to_string())),
			None => {
				let order = Order::new(number, user_id);
				self.storage
					.store(StorageKey::Orders.as_str(), number, &order)
					.await?;
				tracing::info!(order = %number, user_id, "Registered order");
				Ok(order)
			},
		}
	}

	/// Gets an order by number.
	pub async fn get_order(&self, number: &str) -> Result<Order, StorageError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), number)
			.await
	}

	/// Returns all orders of a user, oldest first.
	pub async fn user_orders(&self, user_id: u64) -> Result<Vec<Order>, StorageError> {
		let mut orders: Vec<Order> = self
			.storage
			.list::<Order>(StorageKey::Orders.as_str())
			.await?
			.into_iter()
			.filter(|o| o.user_id == user_id)
			.collect();
		sort_oldest_first(&mut orders);
		Ok(orders)
	}

	/// Returns the balance of a user, zero if nothing was credited yet.
	pub async fn get_balance(&self, user_id: u64) -> Result<UserBalance, StorageError> {
		match self
			.storage
			.retrieve(StorageKey::Balances.as_str(), &user_id.to_string())
			.await
		{
			Ok(balance) => Ok(balance),
			Err(StorageError::NotFound) => Ok(UserBalance::empty(user_id)),
			Err(e) => Err(e),
		}
	}

	async fn load_order(&self, number: &str) -> Result<Option<Order>, StorageError> {
		match self.get_order(number).await {
			Ok(order) => Ok(Some(order)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Debits `sum` from the user's balance and records the withdrawal.
	///
	/// Fails when the order number does not pass the Luhn check, the sum is not
	/// positive, the balance does not cover it or the order number was already
	/// used for a withdrawal.
	pub async fn withdraw(
		&self,
		user_id: u64,
		order: &str,
		sum: Decimal,
	) -> Result<Withdrawal, StorageError> {
		if !is_valid_luhn(order) {
			return Err(StorageError::InvalidOrderNumber(order.to_string()));
		}
		if sum <= Decimal::ZERO {
			return Err(StorageError::InvalidAmount(sum));
		}

		let _guard = self.write_lock.lock().await;
		if self.load_withdrawal(order).await?.is_some() {
			return Err(StorageError::WithdrawalAlreadyRecorded(order.to_string()));
		}

		let mut balance = self.get_balance(user_id).await?;
		// A debit without its record means an earlier attempt failed halfway
		if !balance.has_withdrawn(order) {
			if !balance.withdraw(order, sum) {
				return Err(StorageError::NotEnoughBalance(sum));
			}
			self.storage
				.store(StorageKey::Balances.as_str(), &user_id.to_string(), &balance)
				.await?;
		}

		let withdrawal = Withdrawal::new(order, sum, user_id);
		self.storage
			.store(StorageKey::Withdrawals.as_str(), order, &withdrawal)
			.await?;
		tracing::info!(order = %order, user_id, %sum, "Recorded withdrawal");
		Ok(withdrawal)
	}

	/// Returns all withdrawals of a user, oldest first.
	pub async fn user_withdrawals(&self, user_id: u64) -> Result<Vec<Withdrawal>, StorageError> {
		let mut withdrawals: Vec<Withdrawal> = self
			.storage
			.list::<Withdrawal>(StorageKey::Withdrawals.as_str())
			.await?
			.into_iter()
			.filter(|w| w.user_id == user_id)
			.collect();
		withdrawals.sort_by(|a, b| {
			a.processed_at
				.cmp(&b.processed_at)
				.then_with(|| a.order.cmp(&b.order))
		});
		Ok(withdrawals)
	}

	async fn load_withdrawal(&self, order: &str) -> Result<Option<Withdrawal>, StorageError> {
		match self
			.storage
			.retrieve(StorageKey::Withdrawals.as_str(), order)
			.await
		{
			Ok(withdrawal) => Ok(Some(withdrawal)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Returns false when the order was already credited to the balance.
	async fn credit_balance(
		&self,
		user_id: u64,
		number: &str,
		amount: Decimal,
	) -> Result<bool, StorageError> {
		let mut balance = self.get_balance(user_id).await?;
		if !balance.credit(number, amount) {
			return Ok(false);
		}
		self.storage
			.store(StorageKey::Balances.as_str(), &user_id.to_string(), &balance)
			.await?;
		Ok(true)
	}
}

#[async_trait]
impl OrderStore for StorageOrderStore {
	async fn fetch_unresolved(&self) -> Result<Vec<Order>, StorageError> {
		let mut orders: Vec<Order> = self
			.storage
			.list::<Order>(StorageKey::Orders.as_str())
			.await?
			.into_iter()
			.filter(|o| o.status.is_unresolved())
			.collect();
		sort_oldest_first(&mut orders);
		Ok(orders)
	}

	async fn update_order(
		&self,
		number: &str,
		status: OrderStatus,
		accrual: Option<Decimal>,
	) -> Result<u64, StorageError> {
		let _guard = self.write_lock.lock().await;

		let Some(mut order) = self.load_order(number).await? else {
			tracing::warn!(order = %number, "Update skipped, order not found");
			return Ok(0);
		};

		if !order.status.can_advance_to(status) {
			tracing::debug!(
				order = %number,
				from = %order.status,
				to = %status,
				"Update skipped, status cannot move backwards"
			);
			return Ok(0);
		}

		order.status = status;
		if accrual.is_some() {
			order.accrual = accrual;
		}
		order.updated_at = Utc::now();

		// Credit first; a replay after a failed order write finds it already applied
		let credit = match (status, order.accrual) {
			(OrderStatus::Processed, Some(amount)) if amount > Decimal::ZERO => Some(amount),
			_ => None,
		};
		let credited = match credit {
			Some(amount) => self.credit_balance(order.user_id, number, amount).await?,
			None => false,
		};

		self.storage
			.update(StorageKey::Orders.as_str(), number, &order)
			.await?;

		if let (true, Some(amount)) = (credited, credit) {
			tracing::info!(order = %number, user_id = order.user_id, %amount, "Credited accrual");
		}
		Ok(1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use crate::StorageInterface;
	use rust_decimal_macros::dec;

	fn store() -> StorageOrderStore {
		StorageOrderStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	/// Memory backend whose writes fail for keys under a chosen namespace.
	#[derive(Clone, Default)]
	struct FailingWrites {
		inner: MemoryStorage,
		namespace: Arc<std::sync::Mutex<Option<&'static str>>>,
	}

	impl FailingWrites {
		fn fail(&self, namespace: Option<&'static str>) {
			*self.namespace.lock().unwrap() = namespace;
		}
	}

	#[async_trait]
	impl StorageInterface for FailingWrites {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			let failing = *self.namespace.lock().unwrap();
			if let Some(namespace) = failing {
				if key.starts_with(&format!("{}:", namespace)) {
					return Err(StorageError::Backend("disk full".to_string()));
				}
			}
			self.inner.set_bytes(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(prefix).await
		}
	}

	fn failing_store() -> (StorageOrderStore, FailingWrites) {
		let backend = FailingWrites::default();
		let store =
			StorageOrderStore::new(Arc::new(StorageService::new(Box::new(backend.clone()))));
		(store, backend)
	}

	async fn credited_store(user_id: u64, amount: Decimal) -> StorageOrderStore {
		let store = store();
		store.register_order("12345678903", user_id).await.unwrap();
		store
			.update_order("12345678903", OrderStatus::Processed, Some(amount))
			.await
			.unwrap();
		store
	}

	#[tokio::test]
	async fn test_register_order() {
		let store = store();
		let order = store.register_order("12345678903", 1).await.unwrap();
		assert_eq!(order.status, OrderStatus::New);

		let stored = store.get_order("12345678903").await.unwrap();
		assert_eq!(stored, order);
	}

	#[tokio::test]
	async fn test_register_rejects_invalid_and_duplicate_numbers() {
		let store = store();
		assert!(matches!(
			store.register_order("12345678901", 1).await,
			Err(StorageError::InvalidOrderNumber(_))
		));

		store.register_order("79927398713", 1).await.unwrap();
		assert!(matches!(
			store.register_order("79927398713", 1).await,
			Err(StorageError::OrderAlreadyUploaded(_))
		));
		assert!(matches!(
			store.register_order("79927398713", 2).await,
			Err(StorageError::OrderOwnedByAnotherUser(_))
		));
	}

	#[tokio::test]
	async fn test_fetch_unresolved_skips_terminal_orders() {
		let store = store();
		store.register_order("12345678903", 1).await.unwrap();
		store.register_order("79927398713", 1).await.unwrap();
		store.register_order("4561261212345467", 1).await.unwrap();

		store
			.update_order("79927398713", OrderStatus::Processing, None)
			.await
			.unwrap();
		store
			.update_order("4561261212345467", OrderStatus::Invalid, None)
			.await
			.unwrap();

		let unresolved = store.fetch_unresolved().await.unwrap();
		let numbers: Vec<_> = unresolved.iter().map(|o| o.number.as_str()).collect();
		assert_eq!(numbers, vec!["12345678903", "79927398713"]);
	}

	#[tokio::test]
	async fn test_processed_update_credits_balance_once() {
		let store = store();
		store.register_order("12345678903", 7).await.unwrap();

		let rows = store
			.update_order("12345678903", OrderStatus::Processed, Some(dec!(500.0)))
			.await
			.unwrap();
		assert_eq!(rows, 1);

		let order = store.get_order("12345678903").await.unwrap();
		assert_eq!(order.status, OrderStatus::Processed);
		assert_eq!(order.accrual, Some(dec!(500.0)));
		assert_eq!(store.get_balance(7).await.unwrap().current, dec!(500.0));

		// Replaying the same update must not credit twice
		let rows = store
			.update_order("12345678903", OrderStatus::Processed, Some(dec!(500.0)))
			.await
			.unwrap();
		assert_eq!(rows, 0);
		assert_eq!(store.get_balance(7).await.unwrap().current, dec!(500.0));
	}

	#[tokio::test]
	async fn test_invalid_update_does_not_credit() {
		let store = store();
		store.register_order("12345678903", 7).await.unwrap();
		store
			.update_order("12345678903", OrderStatus::Invalid, None)
			.await
			.unwrap();

		assert_eq!(store.get_balance(7).await.unwrap().current, Decimal::ZERO);
	}

	#[tokio::test]
	async fn test_update_never_regresses() {
		let store = store();
		store.register_order("12345678903", 1).await.unwrap();
		store
			.update_order("12345678903", OrderStatus::Processing, None)
			.await
			.unwrap();

		let rows = store
			.update_order("12345678903", OrderStatus::New, None)
			.await
			.unwrap();
		assert_eq!(rows, 0);
		assert_eq!(
			store.get_order("12345678903").await.unwrap().status,
			OrderStatus::Processing
		);
	}

	#[tokio::test]
	async fn test_update_missing_order() {
		let store = store();
		let rows = store
			.update_order("12345678903", OrderStatus::Processing, None)
			.await
			.unwrap();
		assert_eq!(rows, 0);
	}

	#[tokio::test]
	async fn test_user_orders_sorted_by_upload_time() {
		let store = store();
		store.register_order("79927398713", 3).await.unwrap();
		tokio::time::sleep(std::time::Duration::from_millis(2)).await;
		store.register_order("12345678903", 3).await.unwrap();
		store.register_order("4561261212345467", 4).await.unwrap();

		let orders = store.user_orders(3).await.unwrap();
		let numbers: Vec<_> = orders.iter().map(|o| o.number.as_str()).collect();
		assert_eq!(numbers, vec!["79927398713", "12345678903"]);
	}

	#[tokio::test]
	async fn test_failed_order_write_replays_without_double_credit() {
		let (store, backend) = failing_store();
		store.register_order("12345678903", 7).await.unwrap();

		backend.fail(Some("orders"));
		let result = store
			.update_order("12345678903", OrderStatus::Processed, Some(dec!(500)))
			.await;
		assert!(matches!(result, Err(StorageError::Backend(_))));
		assert_eq!(
			store.get_order("12345678903").await.unwrap().status,
			OrderStatus::New
		);
		assert_eq!(store.fetch_unresolved().await.unwrap().len(), 1);

		backend.fail(None);
		let rows = store
			.update_order("12345678903", OrderStatus::Processed, Some(dec!(500)))
			.await
			.unwrap();
		assert_eq!(rows, 1);
		assert_eq!(
			store.get_order("12345678903").await.unwrap().status,
			OrderStatus::Processed
		);
		assert_eq!(store.get_balance(7).await.unwrap().current, dec!(500));
	}

	#[tokio::test]
	async fn test_failed_credit_leaves_order_unresolved() {
		let (store, backend) = failing_store();
		store.register_order("12345678903", 7).await.unwrap();

		backend.fail(Some("balances"));
		let result = store
			.update_order("12345678903", OrderStatus::Processed, Some(dec!(500)))
			.await;
		assert!(result.is_err());
		assert_eq!(
			store.get_order("12345678903").await.unwrap().status,
			OrderStatus::New
		);
		assert_eq!(store.get_balance(7).await.unwrap().current, Decimal::ZERO);
	}

	#[tokio::test]
	async fn test_withdraw_debits_balance() {
		let store = credited_store(7, dec!(500)).await;

		let withdrawal = store.withdraw(7, "79927398713", dec!(200)).await.unwrap();
		assert_eq!(withdrawal.order, "79927398713");
		assert_eq!(withdrawal.sum, dec!(200));

		let balance = store.get_balance(7).await.unwrap();
		assert_eq!(balance.current, dec!(300));
		assert_eq!(balance.withdrawn, dec!(200));

		let withdrawals = store.user_withdrawals(7).await.unwrap();
		assert_eq!(withdrawals, vec![withdrawal]);
		assert!(store.user_withdrawals(8).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_withdraw_rejections() {
		let store = credited_store(7, dec!(500)).await;

		assert!(matches!(
			store.withdraw(7, "79927398714", dec!(10)).await,
			Err(StorageError::InvalidOrderNumber(_))
		));
		assert!(matches!(
			store.withdraw(7, "79927398713", Decimal::ZERO).await,
			Err(StorageError::InvalidAmount(_))
		));
		assert!(matches!(
			store.withdraw(7, "79927398713", dec!(500.01)).await,
			Err(StorageError::NotEnoughBalance(_))
		));
		assert!(matches!(
			store.withdraw(8, "79927398713", dec!(1)).await,
			Err(StorageError::NotEnoughBalance(_))
		));

		store.withdraw(7, "79927398713", dec!(100)).await.unwrap();
		assert!(matches!(
			store.withdraw(7, "79927398713", dec!(100)).await,
			Err(StorageError::WithdrawalAlreadyRecorded(_))
		));
		assert_eq!(store.get_balance(7).await.unwrap().current, dec!(400));
	}

	#[tokio::test]
	async fn test_failed_withdrawal_record_replays_without_double_debit() {
		let (store, backend) = failing_store();
		store.register_order("12345678903", 7).await.unwrap();
		store
			.update_order("12345678903", OrderStatus::Processed, Some(dec!(500)))
			.await
			.unwrap();

		backend.fail(Some("withdrawals"));
		assert!(store.withdraw(7, "79927398713", dec!(200)).await.is_err());
		assert!(store.user_withdrawals(7).await.unwrap().is_empty());

		backend.fail(None);
		store.withdraw(7, "79927398713", dec!(200)).await.unwrap();

		let balance = store.get_balance(7).await.unwrap();
		assert_eq!(balance.current, dec!(300));
		assert_eq!(balance.withdrawn, dec!(200));
		assert_eq!(store.user_withdrawals(7).await.unwrap().len(), 1);
	}
}
