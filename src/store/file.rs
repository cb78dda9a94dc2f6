//! File-backed [`TokenStore`] writing one JSON document per deployment.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{RefreshPolicy, TokenRecord, TokenSecret, policy},
	store::{StoreError, StoreFuture, TokenStore},
};

/// On-disk layout. Unknown keys written by neighbouring tools are carried through untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoredDocument {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	access_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	issued_at: Option<OffsetDateTime>,
	#[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	expires_at: Option<OffsetDateTime>,
	#[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
	invalidated_at: Option<OffsetDateTime>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	invalid_reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	auto_refresh_enabled: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_buffer_minutes: Option<i64>,
	#[serde(flatten)]
	extra: serde_json::Map<String, serde_json::Value>,
}
impl StoredDocument {
	fn record(&self) -> Option<TokenRecord> {
		let access_token = self.access_token.as_ref()?;
		let expires_at = self.expires_at?;

		Some(TokenRecord {
			access_token: TokenSecret::new(access_token.as_str()),
			refresh_token: self.refresh_token.as_deref().map(TokenSecret::new),
			// Documents written before issued_at was tracked only know the expiry.
			issued_at: self.issued_at.unwrap_or(expires_at),
			expires_at,
			invalidated_at: self.invalidated_at,
			invalid_reason: self.invalid_reason.clone(),
		})
	}

	fn set_record(&mut self, record: TokenRecord) {
		self.access_token = Some(record.access_token.expose().to_owned());
		self.refresh_token = record.refresh_token.map(|secret| secret.expose().to_owned());
		self.issued_at = Some(record.issued_at);
		self.expires_at = Some(record.expires_at);
		self.invalidated_at = record.invalidated_at;
		self.invalid_reason = record.invalid_reason;
	}

	fn policy(&self) -> Result<Option<RefreshPolicy>, StoreError> {
		if self.auto_refresh_enabled.is_none() && self.refresh_buffer_minutes.is_none() {
			return Ok(None);
		}

		let mut loaded = RefreshPolicy::default();

		if let Some(enabled) = self.auto_refresh_enabled {
			loaded.auto_refresh_enabled = enabled;
		}
		if let Some(minutes) = self.refresh_buffer_minutes {
			loaded.buffer = policy::buffer_from_minutes(minutes).ok_or_else(|| {
				StoreError::Serialization {
					message: format!("refresh_buffer_minutes {minutes} is out of range"),
				}
			})?;
		}

		Ok(Some(loaded))
	}

	fn set_policy(&mut self, policy: RefreshPolicy) {
		self.auto_refresh_enabled = Some(policy.auto_refresh_enabled);
		self.refresh_buffer_minutes = Some(policy.buffer_minutes());
	}
}

/// Persists the token record and refresh policy to a JSON file via write-temp, fsync, rename.
///
/// The in-memory copy is only updated after the file has been replaced, so a failed write never
/// leaves the store reporting data that is not on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<StoredDocument>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let document = Self::load_document(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(document)) })
	}

	/// Location of the backing document.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_document(path: &Path) -> Result<StoredDocument, StoreError> {
		if !path.exists() {
			return Ok(StoredDocument::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(StoredDocument::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, document: &StoredDocument) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(document).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize token document: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn update(&self, apply: impl FnOnce(&mut StoredDocument)) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		apply(&mut next);
		self.persist(&next)?;

		*guard = next;

		Ok(())
	}
}
impl TokenStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.inner.read().record()) })
	}

	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.update(|doc| doc.set_record(record)) })
	}

	fn load_policy(&self) -> StoreFuture<'_, Option<RefreshPolicy>> {
		Box::pin(async move { self.inner.read().policy() })
	}

	fn save_policy(&self, policy: RefreshPolicy) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.update(|doc| doc.set_policy(policy)) })
	}
}
