//! Storage-related types for the reconciliation system.

/// Storage keys for different data collections.
///
/// Replaces string literals with strongly typed namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing order data
	Orders,
	/// Key for storing user balances
	Balances,
	/// Key for storing withdrawals, one entry per order number
	Withdrawals,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Balances => "balances",
			StorageKey::Withdrawals => "withdrawals",
		}
	}
}
