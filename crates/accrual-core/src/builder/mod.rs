//! Builder pattern for constructing reconciliation engines.
//!
//! Composes a `ReconciliationEngine` from configuration and factory functions,
//! so storage backends and the accrual client stay pluggable.

use crate::engine::ReconciliationEngine;
use accrual_client::{AccrualError, AccrualInterface};
use accrual_config::{AccrualConfig, Config};
use accrual_storage::{StorageError, StorageInterface, StorageOrderStore, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions needed to build a `ReconciliationEngine`.
pub struct EngineFactories<SF, CF> {
	pub storage_factories: HashMap<String, SF>,
	pub accrual_factory: CF,
}

/// Builder for constructing a `ReconciliationEngine` with pluggable implementations.
pub struct EngineBuilder {
	config: Config,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine, instantiating every configured storage backend that has a factory
	/// and using the primary one.
	pub fn build<SF, CF>(
		self,
		factories: EngineFactories<SF, CF>,
	) -> Result<ReconciliationEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		CF: Fn(&AccrualConfig) -> Result<Box<dyn AccrualInterface>, AccrualError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(component = "storage", implementation = %name, "No factory registered, skipping");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					storage_impls.insert(name.clone(), implementation);
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!("primary storage '{}'", primary_storage))
		})?;
		let store = StorageOrderStore::new(Arc::new(StorageService::new(storage_backend)));

		let client = (factories.accrual_factory)(&self.config.accrual).map_err(|e| {
			BuilderError::Config(format!("Failed to create accrual client: {}", e))
		})?;
		tracing::info!(component = "accrual", base_url = %self.config.accrual.base_url, "Loaded");

		Ok(ReconciliationEngine::new(
			Arc::new(store),
			Arc::from(client),
			self.config.processing,
		))
	}
}
