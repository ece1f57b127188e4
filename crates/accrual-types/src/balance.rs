//! User balance and withdrawal types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Running balance of a user.
///
/// Credited whenever one of their orders is processed and debited by
/// withdrawals. The balance remembers which orders it already accounted for,
/// so replaying a credit or a withdrawal after a partial failure is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
	/// Owner of the balance.
	pub user_id: u64,
	/// Amount available for withdrawal.
	pub current: Decimal,
	/// Total amount withdrawn so far.
	#[serde(default)]
	pub withdrawn: Decimal,
	/// Processed orders whose accrual is included in `current`.
	#[serde(default)]
	pub credited_orders: BTreeSet<String>,
	/// Order numbers already paid out by a withdrawal.
	#[serde(default)]
	pub withdrawn_orders: BTreeSet<String>,
}

impl UserBalance {
	/// Creates an empty balance for the given user.
	pub fn empty(user_id: u64) -> Self {
		Self {
			user_id,
			current: Decimal::ZERO,
			withdrawn: Decimal::ZERO,
			credited_orders: BTreeSet::new(),
			withdrawn_orders: BTreeSet::new(),
		}
	}

	/// Adds a processed order's accrual to the balance.
	///
	/// Returns false, leaving the balance untouched, when the order was already credited.
	pub fn credit(&mut self, order: &str, amount: Decimal) -> bool {
		if !self.credited_orders.insert(order.to_string()) {
			return false;
		}
		self.current += amount;
		true
	}

	/// Returns true when a withdrawal for this order number was already debited.
	pub fn has_withdrawn(&self, order: &str) -> bool {
		self.withdrawn_orders.contains(order)
	}

	/// Moves `sum` from the current balance to the withdrawn total.
	///
	/// Returns false when the current balance does not cover the sum or the
	/// order number was already used for a withdrawal.
	pub fn withdraw(&mut self, order: &str, sum: Decimal) -> bool {
		if sum > self.current || self.has_withdrawn(order) {
			return false;
		}
		self.withdrawn_orders.insert(order.to_string());
		self.current -= sum;
		self.withdrawn += sum;
		true
	}
}

/// A withdrawal of accrued points against an order number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
	/// Order number the points were spent on.
	pub order: String,
	/// Withdrawn amount.
	pub sum: Decimal,
	/// User whose balance was debited.
	pub user_id: u64,
	/// When the withdrawal was recorded.
	pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
	pub fn new(order: impl Into<String>, sum: Decimal, user_id: u64) -> Self {
		Self {
			order: order.into(),
			sum,
			user_id,
			processed_at: Utc::now(),
		}
	}
}
