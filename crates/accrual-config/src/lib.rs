//! Configuration module for the accrual reconciliation service.
//!
//! This module provides structures and utilities for managing service configuration.
//! Configuration is loaded from a TOML file, environment variables referenced as
//! `${VAR}` or `${VAR:-default}` are substituted before parsing, and the result is
//! validated before it is handed to the engine.

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only, the span dump is unreadable in logs
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the reconciliation service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Connection settings for the external accrual service.
	pub accrual: AccrualConfig,
	/// Scheduling settings for the poller and processor.
	#[serde(default)]
	pub processing: ProcessingConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Settings for the accrual service client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccrualConfig {
	/// Base URL of the accrual service, e.g. `http://localhost:8081`.
	pub base_url: String,
	/// Maximum number of retries after the first attempt.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Lower bound of the delay between retries, in milliseconds.
	#[serde(default = "default_retry_wait_min_ms")]
	pub retry_wait_min_ms: u64,
	/// Upper bound of the delay between retries, in milliseconds.
	#[serde(default = "default_retry_wait_max_ms")]
	pub retry_wait_max_ms: u64,
	/// Timeout for a single HTTP request, in seconds.
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
}

impl AccrualConfig {
	/// Lower bound of the retry delay.
	pub fn retry_wait_min(&self) -> Duration {
		Duration::from_millis(self.retry_wait_min_ms)
	}

	/// Upper bound of the retry delay.
	pub fn retry_wait_max(&self) -> Duration {
		Duration::from_millis(self.retry_wait_max_ms)
	}

	/// Timeout for a single request.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_seconds)
	}
}

fn default_max_retries() -> u32 {
	3
}

fn default_retry_wait_min_ms() -> u64 {
	1_000
}

fn default_retry_wait_max_ms() -> u64 {
	30_000
}

fn default_request_timeout_seconds() -> u64 {
	10
}

/// Scheduling settings for the reconciliation loops.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
	/// Interval between two fetches of unresolved orders, in seconds.
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	/// Capacity of the queue between the poller and the processor.
	#[serde(default = "default_queue_capacity")]
	pub queue_capacity: usize,
}

impl ProcessingConfig {
	/// Interval between two polling ticks.
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}
}

impl Default for ProcessingConfig {
	fn default() -> Self {
		Self {
			poll_interval_seconds: default_poll_interval_seconds(),
			queue_capacity: default_queue_capacity(),
		}
	}
}

fn default_poll_interval_seconds() -> u64 {
	10
}

fn default_queue_capacity() -> usize {
	10
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		// Accrual client
		let base_url = self.accrual.base_url.trim();
		if base_url.is_empty() {
			return Err(ConfigError::Validation(
				"Accrual base_url cannot be empty".into(),
			));
		}
		if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
			return Err(ConfigError::Validation(format!(
				"Accrual base_url must start with http:// or https://, got '{}'",
				base_url
			)));
		}
		if self.accrual.retry_wait_min_ms > self.accrual.retry_wait_max_ms {
			return Err(ConfigError::Validation(
				"retry_wait_min_ms cannot exceed retry_wait_max_ms".into(),
			));
		}
		if self.accrual.max_retries > 10 {
			return Err(ConfigError::Validation(
				"max_retries cannot exceed 10".into(),
			));
		}
		if self.accrual.request_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"request_timeout_seconds must be greater than 0".into(),
			));
		}

		// Processing loops
		if self.processing.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"poll_interval_seconds must be greater than 0".into(),
			));
		}
		if self.processing.poll_interval_seconds > 3600 {
			return Err(ConfigError::Validation(
				"poll_interval_seconds cannot exceed 3600 (1 hour)".into(),
			));
		}
		if self.processing.queue_capacity == 0 {
			return Err(ConfigError::Validation(
				"queue_capacity must be at least 1".into(),
			));
		}
		if self.processing.queue_capacity > 10_000 {
			return Err(ConfigError::Validation(
				"queue_capacity cannot exceed 10000".into(),
			));
		}

		// Storage
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		Ok(())
	}
}

/// Parses a configuration from TOML text.
///
/// Environment variables are resolved first and the configuration is
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
