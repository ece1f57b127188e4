//! Accrual service types.
//!
//! Wire format of the external accrual service and the typed outcome the
//! client derives from each response.

use crate::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status reported by the accrual service for a registered order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
	Registered,
	Processing,
	Invalid,
	Processed,
}

impl From<AccrualStatus> for OrderStatus {
	fn from(status: AccrualStatus) -> Self {
		match status {
			AccrualStatus::Registered => OrderStatus::Registered,
			AccrualStatus::Processing => OrderStatus::Processing,
			AccrualStatus::Invalid => OrderStatus::Invalid,
			AccrualStatus::Processed => OrderStatus::Processed,
		}
	}
}

/// Body of a `200 OK` response from `GET /api/orders/{number}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualOrderInfo {
	/// Order number echoed back by the service.
	pub order: String,
	/// Calculation status.
	pub status: AccrualStatus,
	/// Accrued amount, present only for processed orders.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accrual: Option<Decimal>,
}

/// Classified result of a single accrual lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
	/// The service knows the order and reported its status.
	Resolved(AccrualOrderInfo),
	/// The service has no record of the order yet (`204 No Content`).
	Unknown,
	/// The service asked us to back off (`429 Too Many Requests`).
	RateLimited {
		/// How long to pause before the next request.
		cooldown: Duration,
		/// Request budget advertised by the service.
		max_rpm: u32,
	},
	/// Network or server failure that survived every retry.
	TransientError {
		/// Number of attempts made, including the first one.
		attempts: u32,
		/// Description of the last failure.
		reason: String,
	},
}
