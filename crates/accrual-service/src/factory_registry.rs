//! Factory registry for pluggable implementations.
//!
//! Collects every storage backend the storage crate ships and resolves the
//! ones named in the configuration before the engine is built.

use accrual_config::Config;
use accrual_core::{EngineBuilder, EngineFactories, ReconciliationEngine};
use accrual_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Registry of all known implementation factories.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
		}
	}

	/// Register a storage implementation
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	/// Picks the storage factories for the configured implementations.
	///
	/// Fails on the first implementation nobody registered.
	pub fn storage_factories(
		&self,
		config: &Config,
	) -> Result<HashMap<String, StorageFactory>, String> {
		let mut factories = HashMap::new();
		for name in config.storage.implementations.keys() {
			match self.storage.get(name) {
				Some(factory) => {
					factories.insert(name.clone(), *factory);
				},
				None => {
					let mut available: Vec<_> = self.storage.keys().cloned().collect();
					available.sort();
					return Err(format!(
						"Unknown storage implementation '{}'. Available: [{}]",
						name,
						available.join(", ")
					));
				},
			}
		}
		Ok(factories)
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();
		for (name, factory) in accrual_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}
		registry
	})
}

/// Builds the reconciliation engine from configuration.
pub fn build_engine_from_config(
	config: Config,
) -> Result<ReconciliationEngine, Box<dyn std::error::Error>> {
	let storage_factories = get_registry().storage_factories(&config)?;

	let engine = EngineBuilder::new(config).build(EngineFactories {
		storage_factories,
		accrual_factory: accrual_client::create_accrual_client,
	})?;
	Ok(engine)
}
