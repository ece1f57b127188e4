//! Order types for the reconciliation engine.
//!
//! An order is submitted by a user and resolved by polling the external
//! accrual service until it reaches a terminal status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A submitted order whose outcome is resolved by the accrual service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
	/// Unique external identifier (primary key).
	pub number: String,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Accrued amount, only meaningful once the order is `PROCESSED`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accrual: Option<Decimal>,
	/// Identifier of the user who submitted the order.
	pub user_id: u64,
	/// Timestamp when the order was submitted.
	pub uploaded_at: DateTime<Utc>,
	/// Timestamp of the last status change.
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Creates a freshly submitted order in the `NEW` status.
	pub fn new(number: impl Into<String>, user_id: u64) -> Self {
		let now = Utc::now();
		Self {
			number: number.into(),
			status: OrderStatus::New,
			accrual: None,
			user_id,
			uploaded_at: now,
			updated_at: now,
		}
	}
}

/// Status of an order.
///
/// Statuses only move forward: `NEW -> REGISTERED -> PROCESSING -> {INVALID, PROCESSED}`.
/// The accrual service may skip intermediate steps, but never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
	/// Submitted, not yet picked up by the processor.
	New,
	/// Known to the accrual service, calculation not started.
	Registered,
	/// Picked up for reconciliation or being calculated by the accrual service.
	Processing,
	/// Rejected by the accrual service. Terminal.
	Invalid,
	/// Accrual calculated. Terminal.
	Processed,
}

impl OrderStatus {
	/// Returns true when no further transitions can happen.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
	}

	/// Returns true for the statuses the poller keeps re-fetching.
	pub fn is_unresolved(&self) -> bool {
		matches!(self, OrderStatus::New | OrderStatus::Processing)
	}

	fn rank(&self) -> u8 {
		match self {
			OrderStatus::New => 0,
			OrderStatus::Registered => 1,
			OrderStatus::Processing => 2,
			OrderStatus::Invalid | OrderStatus::Processed => 3,
		}
	}

	/// Checks whether moving from `self` to `next` keeps the progression forward-only.
	///
	/// Writing the current status again is allowed so updates stay idempotent,
	/// except for terminal statuses which accept no writes at all.
	pub fn can_advance_to(&self, next: OrderStatus) -> bool {
		if self.is_terminal() {
			return false;
		}
		next.rank() >= self.rank()
	}

	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::New => "NEW",
			OrderStatus::Registered => "REGISTERED",
			OrderStatus::Processing => "PROCESSING",
			OrderStatus::Invalid => "INVALID",
			OrderStatus::Processed => "PROCESSED",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
