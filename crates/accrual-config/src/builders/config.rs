//! Configuration builder for creating test and development configurations.

use crate::{AccrualConfig, Config, ProcessingConfig, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults describe an in-memory setup pointing at a local accrual service.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	accrual_base_url: String,
	max_retries: u32,
	retry_wait_min_ms: u64,
	retry_wait_max_ms: u64,
	poll_interval_seconds: u64,
	queue_capacity: usize,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Self {
			service_id: "test-reconciler".to_string(),
			accrual_base_url: "http://127.0.0.1:8081".to_string(),
			max_retries: 3,
			retry_wait_min_ms: 10,
			retry_wait_max_ms: 50,
			poll_interval_seconds: 10,
			queue_capacity: 10,
			storage_primary: "memory".to_string(),
			storage_implementations,
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the accrual service base URL.
	pub fn accrual_base_url(mut self, url: impl Into<String>) -> Self {
		self.accrual_base_url = url.into();
		self
	}

	/// Sets the maximum number of retries.
	pub fn max_retries(mut self, retries: u32) -> Self {
		self.max_retries = retries;
		self
	}

	/// Sets the retry delay bounds in milliseconds.
	pub fn retry_wait_ms(mut self, min: u64, max: u64) -> Self {
		self.retry_wait_min_ms = min;
		self.retry_wait_max_ms = max;
		self
	}

	/// Sets the polling interval in seconds.
	pub fn poll_interval_seconds(mut self, interval: u64) -> Self {
		self.poll_interval_seconds = interval;
		self
	}

	/// Sets the queue capacity.
	pub fn queue_capacity(mut self, capacity: usize) -> Self {
		self.queue_capacity = capacity;
		self
	}

	/// Sets the primary storage implementation and its configuration.
	pub fn storage(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		let primary = primary.into();
		self.storage_implementations.insert(primary.clone(), config);
		self.storage_primary = primary;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			accrual: AccrualConfig {
				base_url: self.accrual_base_url,
				max_retries: self.max_retries,
				retry_wait_min_ms: self.retry_wait_min_ms,
				retry_wait_max_ms: self.retry_wait_max_ms,
				request_timeout_seconds: 5,
			},
			processing: ProcessingConfig {
				poll_interval_seconds: self.poll_interval_seconds,
				queue_capacity: self.queue_capacity,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
		}
	}
}
