//! Accrual service client for the reconciliation system.
//!
//! This module defines the interface the reconciliation engine uses to look up
//! orders in the external accrual service, the retry policy applied to
//! transient failures, and the classification of every response into an
//! `AccrualOutcome`.

use accrual_types::AccrualOutcome;
use async_trait::async_trait;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
}

pub mod retry;

pub use implementations::http::{create_accrual_client, HttpAccrualClient};
pub use retry::RetryPolicy;

/// Errors that can occur while querying the accrual service.
///
/// Transient network and server failures are not errors: they are retried and,
/// once retries are exhausted, reported as `AccrualOutcome::TransientError`.
#[derive(Debug, Error)]
pub enum AccrualError {
	/// Error in the client configuration, such as an unusable base URL.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The request could not be built.
	#[error("Request error: {0}")]
	Request(String),
	/// The response had a known status but an unusable body or headers.
	#[error("Malformed accrual response: {0}")]
	MalformedResponse(String),
	/// The response status is not part of the accrual protocol.
	#[error("Unrecognized accrual response status: {0}")]
	UnrecognizedStatus(u16),
}

/// Trait defining the interface to the external accrual service.
#[async_trait]
pub trait AccrualInterface: Send + Sync {
	/// Looks up an order and classifies the service's answer.
	async fn fetch_order_info(&self, number: &str) -> Result<AccrualOutcome, AccrualError>;
}
