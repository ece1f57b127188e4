//! File-based storage backend implementation.
//!
//! Each key `namespace:id` is stored as `<storage_path>/<namespace>/<id>.json`.
//! Writes go to a temporary file first and are renamed into place, so a crash
//! never leaves a half-written value behind.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name under which this backend is registered.
pub const NAME: &str = "file";

const EXTENSION: &str = "json";

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage instance rooted at the given directory.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to its file path.
	///
	/// Keys must have the form `namespace:id`, and neither part may contain
	/// path separators.
	fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		let (namespace, id) = key
			.split_once(':')
			.ok_or_else(|| StorageError::Backend(format!("Malformed storage key: {}", key)))?;

		let is_safe = |part: &str| {
			!part.is_empty() && part != ".." && !part.contains(['/', '\\', ':'])
		};
		if !is_safe(namespace) || !is_safe(id) {
			return Err(StorageError::Backend(format!(
				"Storage key cannot be mapped to a file: {}",
				key
			)));
		}

		Ok(self
			.base_path
			.join(namespace)
			.join(format!("{}.{}", id, EXTENSION)))
	}

	/// Collects the keys stored in one namespace directory.
	async fn keys_in(&self, namespace: &str, dir: &Path) -> Result<Vec<String>, StorageError> {
		let mut keys = Vec::new();
		let mut entries = fs::read_dir(dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(EXTENSION)) {
				continue;
			}
			match path.file_stem().and_then(|s| s.to_str()) {
				Some(id) => keys.push(format!("{}:{}", namespace, id)),
				None => tracing::debug!("Skipping file {:?}: name is not valid UTF-8", path),
			}
		}
		Ok(keys)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key)?;

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key)?;

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key)?;

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.get_file_path(key)?;
		fs::try_exists(&path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut keys = Vec::new();
		let mut namespaces = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(entry) = namespaces
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let is_dir = entry
				.file_type()
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?
				.is_dir();
			if !is_dir {
				continue;
			}
			let path = entry.path();
			let Some(namespace) = path.file_name().and_then(|s| s.to_str()) else {
				continue;
			};
			// Skip namespaces that cannot match before touching the directory
			let ns_prefix = format!("{}:", namespace);
			if !ns_prefix.starts_with(prefix) && !prefix.starts_with(&ns_prefix) {
				continue;
			}

			keys.extend(
				self.keys_in(namespace, &path)
					.await?
					.into_iter()
					.filter(|key| key.starts_with(prefix)),
			);
		}
		Ok(keys)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = match config.get("storage_path") {
		None => "./data/storage",
		Some(value) => value.as_str().ok_or_else(|| {
			StorageError::Configuration("storage_path must be a string".into())
		})?,
	};

	if storage_path.is_empty() {
		return Err(StorageError::Configuration(
			"storage_path cannot be empty".into(),
		));
	}

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage.set_bytes("orders:42", b"payload".to_vec()).await.unwrap();
		assert!(dir.path().join("orders").join("42.json").exists());
		assert_eq!(storage.get_bytes("orders:42").await.unwrap(), b"payload");
		assert!(storage.exists("orders:42").await.unwrap());

		storage.delete("orders:42").await.unwrap();
		assert!(!storage.exists("orders:42").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:42").await,
			Err(StorageError::NotFound)
		));

		// Deleting twice is not an error
		storage.delete("orders:42").await.unwrap();
	}

	#[tokio::test]
	async fn test_overwrite_leaves_no_temp_file() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage.set_bytes("orders:1", b"first".to_vec()).await.unwrap();
		storage.set_bytes("orders:1", b"second".to_vec()).await.unwrap();

		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"second");
		assert!(!dir.path().join("orders").join("1.tmp").exists());
	}

	#[tokio::test]
	async fn test_list_keys() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		assert!(storage.list_keys("orders:").await.unwrap().is_empty());

		storage.set_bytes("orders:1", vec![1]).await.unwrap();
		storage.set_bytes("orders:2", vec![2]).await.unwrap();
		storage.set_bytes("balances:1", vec![3]).await.unwrap();

		let mut keys = storage.list_keys("orders:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:1".to_string(), "orders:2".to_string()]);

		let all = storage.list_keys("").await.unwrap();
		assert_eq!(all.len(), 3);
	}

	#[tokio::test]
	async fn test_list_keys_skips_stray_files() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage.set_bytes("orders:1", vec![1]).await.unwrap();
		fs::write(dir.path().join("README"), b"stray").await.unwrap();

		let keys = storage.list_keys("").await.unwrap();
		assert_eq!(keys, vec!["orders:1".to_string()]);
	}

	#[tokio::test]
	async fn test_unsafe_keys_rejected() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		for key in ["orders", "orders:../x", "../x:1", "orders:"] {
			let result = storage.set_bytes(key, vec![0]).await;
			assert!(
				matches!(result, Err(StorageError::Backend(_))),
				"key {} should be rejected",
				key
			);
		}
	}

	#[test]
	fn test_factory_rejects_non_string_path() {
		let config: toml::Value = toml::from_str("storage_path = 5").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
