//! Storage module for the accrual reconciliation system.
//!
//! This module provides a key-value abstraction over storage backends
//! (in-memory or file-based), a typed `StorageService` on top of it, and the
//! `OrderStore` used by the reconciliation engine to read unresolved orders and
//! persist their outcomes.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub mod orders;

pub use orders::{OrderStore, StorageOrderStore};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The order number failed the Luhn check.
	#[error("Invalid order number: {0}")]
	InvalidOrderNumber(String),
	/// The same user already uploaded this order.
	#[error("Order {0} has already been uploaded by this user")]
	OrderAlreadyUploaded(String),
	/// Another user already uploaded this order.
	#[error("Order {0} has already been uploaded by another user")]
	OrderOwnedByAnotherUser(String),
	/// The current balance does not cover a withdrawal.
	#[error("Not enough balance to withdraw {0}")]
	NotEnoughBalance(rust_decimal::Decimal),
	/// A withdrawal sum was zero or negative.
	#[error("Invalid withdrawal sum: {0}")]
	InvalidAmount(rust_decimal::Decimal),
	/// A withdrawal against this order number was already recorded.
	#[error("Withdrawal for order {0} has already been recorded")]
	WithdrawalAlreadyRecorded(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends store raw bytes under string keys of the form `namespace:id`.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every key starting with the given prefix.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::NAME, file::create_storage as StorageFactory),
		(memory::NAME, memory::create_storage as StorageFactory),
	]
}

/// High-level storage service that provides typed operations.
///
/// Values are serialized to JSON; the namespace and id are combined into the
/// backend key.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Updates an existing value in storage.
	///
	/// Unlike `store`, fails with `NotFound` when the key does not exist yet.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Retrieves every value stored in a namespace.
	///
	/// Entries removed between listing and reading are skipped.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let keys = self.backend.list_keys(&prefix).await?;

		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let value = serde_json::from_slice(&bytes)
				.map_err(|e| StorageError::Serialization(e.to_string()))?;
			values.push(value);
		}
		Ok(values)
	}
}
