//! HTTP implementation of the accrual client.
//!
//! Queries `GET {base_url}/api/orders/{number}`. Connection failures and
//! server errors are retried according to the configured `RetryPolicy`;
//! everything else is classified on the first response.

use crate::{AccrualError, AccrualInterface, RetryPolicy};
use accrual_config::AccrualConfig;
use accrual_types::{truncate_id, AccrualOrderInfo, AccrualOutcome};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Accrual client talking to the service over HTTP.
pub struct HttpAccrualClient {
	client: reqwest::Client,
	base_url: Url,
	retry: RetryPolicy,
}

impl HttpAccrualClient {
	/// Creates a client for the service at `base_url`.
	pub fn new(
		base_url: &str,
		retry: RetryPolicy,
		timeout: Duration,
	) -> Result<Self, AccrualError> {
		let base_url = Url::parse(base_url).map_err(|e| {
			AccrualError::Configuration(format!("Invalid accrual base URL {}: {}", base_url, e))
		})?;
		if base_url.cannot_be_a_base() {
			return Err(AccrualError::Configuration(format!(
				"Accrual base URL cannot carry a path: {}",
				base_url
			)));
		}

		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| AccrualError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url,
			retry,
		})
	}

	fn order_url(&self, number: &str) -> Result<Url, AccrualError> {
		let mut url = self.base_url.clone();
		url.path_segments_mut()
			.map_err(|_| AccrualError::Request(format!("Cannot append path to {}", self.base_url)))?
			.pop_if_empty()
			.extend(["api", "orders", number]);
		Ok(url)
	}
}

/// Server errors worth another attempt. `501` means the endpoint will never work.
fn is_retryable(status: StatusCode) -> bool {
	status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED
}

/// Maps a final response onto an outcome.
fn classify(
	status: StatusCode,
	retry_after: Option<&str>,
	body: &str,
) -> Result<AccrualOutcome, AccrualError> {
	match status {
		StatusCode::OK => {
			let info = serde_json::from_str::<AccrualOrderInfo>(body)
				.map_err(|e| AccrualError::MalformedResponse(format!("Invalid order body: {}", e)))?;
			match info.accrual {
				Some(amount) if amount.is_sign_negative() => Err(AccrualError::MalformedResponse(
					format!("Negative accrual: {}", amount),
				)),
				_ => Ok(AccrualOutcome::Resolved(info)),
			}
		},
		StatusCode::NO_CONTENT => Ok(AccrualOutcome::Unknown),
		StatusCode::TOO_MANY_REQUESTS => parse_rate_limit(retry_after, body),
		other => Err(AccrualError::UnrecognizedStatus(other.as_u16())),
	}
}

fn parse_rate_limit(retry_after: Option<&str>, body: &str) -> Result<AccrualOutcome, AccrualError> {
	let retry_after = retry_after.ok_or_else(|| {
		AccrualError::MalformedResponse("Rate limit response without Retry-After header".into())
	})?;
	let seconds: u64 = retry_after.trim().parse().map_err(|_| {
		AccrualError::MalformedResponse(format!("Invalid Retry-After value: {}", retry_after))
	})?;

	// First integer in the body, e.g. "No more than 10 requests per minute allowed"
	let pattern = Regex::new(r"(\d+)")
		.map_err(|e| AccrualError::MalformedResponse(format!("Regex error: {}", e)))?;
	let max_rpm: u32 = pattern
		.captures(body)
		.and_then(|c| c.get(1))
		.ok_or_else(|| {
			AccrualError::MalformedResponse(format!("No request limit in rate limit body: {}", body))
		})?
		.as_str()
		.parse()
		.map_err(|e| AccrualError::MalformedResponse(format!("Invalid request limit: {}", e)))?;

	Ok(AccrualOutcome::RateLimited {
		cooldown: Duration::from_secs(seconds),
		max_rpm,
	})
}

#[async_trait]
impl AccrualInterface for HttpAccrualClient {
	async fn fetch_order_info(&self, number: &str) -> Result<AccrualOutcome, AccrualError> {
		let url = self.order_url(number)?;
		let attempts = self.retry.max_attempts();
		let mut last_failure = String::new();

		for attempt in 1..=attempts {
			if attempt > 1 {
				let delay = self.retry.next_delay(attempt - 1);
				tracing::debug!(
					order = %truncate_id(number),
					attempt,
					delay_ms = delay.as_millis() as u64,
					"Retrying accrual request"
				);
				tokio::time::sleep(delay).await;
			}

			let response = match self.client.get(url.clone()).send().await {
				Ok(response) => response,
				Err(e) => {
					tracing::warn!(order = %truncate_id(number), attempt, error = %e, "Accrual request failed");
					last_failure = e.to_string();
					continue;
				},
			};

			let status = response.status();
			if is_retryable(status) {
				tracing::warn!(order = %truncate_id(number), attempt, %status, "Accrual service error");
				last_failure = format!("accrual service responded with {}", status);
				continue;
			}

			let retry_after = response
				.headers()
				.get(RETRY_AFTER)
				.and_then(|v| v.to_str().ok())
				.map(str::to_owned);

			match response.text().await {
				Ok(body) => return classify(status, retry_after.as_deref(), &body),
				Err(e) => {
					tracing::warn!(order = %truncate_id(number), attempt, error = %e, "Failed to read accrual response");
					last_failure = e.to_string();
				},
			}
		}

		Ok(AccrualOutcome::TransientError {
			attempts,
			reason: last_failure,
		})
	}
}

/// Factory function to create an accrual client from configuration.
pub fn create_accrual_client(
	config: &AccrualConfig,
) -> Result<Box<dyn AccrualInterface>, AccrualError> {
	let client = HttpAccrualClient::new(
		&config.base_url,
		RetryPolicy::from_config(config),
		config.request_timeout(),
	)?;
	Ok(Box::new(client))
}
