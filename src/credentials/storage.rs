//! Process-wide credential store backed by the configuration document.

use super::{format_round_trip, parse_round_trip, CredentialKey};
use crate::config::{reset_resolved_path, resolve_config_path};
use crate::document::{AttributeDocument, DocumentLoader, XmlDocumentLoader};
use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

static GLOBAL_STORE: StoreCell = StoreCell::new();

/// Typed access to the credential attributes of a configuration file.
///
/// # Thread Safety
/// - The document sits behind an `RwLock`: reads run concurrently, while
///   `set` and `save` are exclusive
/// - [`read`](Self::read) and [`update_and_save`](Self::update_and_save) hold
///   one lock acquisition for a whole batch, so a batch never interleaves with
///   another caller's writes
/// - Nothing guards against other processes writing the same file
pub struct CredentialStore {
    path: PathBuf,
    document: RwLock<Box<dyn AttributeDocument>>,
}

impl CredentialStore {
    /// Loads the document at `path` through `loader`.
    ///
    /// A load failure is fatal: the store never starts from an empty document,
    /// which would blank existing credentials on the next save.
    pub fn open(path: impl Into<PathBuf>, loader: &dyn DocumentLoader) -> ConfigResult<Self> {
        let path = path.into();
        let document = loader
            .load(&path)
            .map_err(|source| ConfigError::ConfigurationLoadError {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Opened credential store");
        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    /// The process-wide store, opened from the resolved configuration path on
    /// first use.
    ///
    /// Concurrent first callers wait for a single load. If opening fails the
    /// error goes to the caller that triggered it and the next call retries.
    pub fn global() -> ConfigResult<Arc<Self>> {
        GLOBAL_STORE.get_or_try_init(|| {
            let path = resolve_config_path()?;
            Self::open(path, &XmlDocumentLoader)
        })
    }

    /// Drops the process-wide store and the cached configuration path.
    /// Handles obtained earlier stay usable.
    pub fn reset_global() {
        GLOBAL_STORE.reset();
        reset_resolved_path();
    }

    /// Path the store loads from and saves to.
    pub fn config_path(&self) -> &Path {
        &self.path
    }

    /// Stored value, or an empty string when the attribute is absent.
    pub fn get(&self, key: &str) -> String {
        self.read(|reader| reader.get(key))
    }

    /// Updates the in-memory document. Nothing is written until [`save`](Self::save).
    pub fn set(&self, key: &str, value: &str) {
        self.update(|writer| writer.set(key, value));
    }

    /// Writes the whole document back to the configuration file.
    ///
    /// On failure the unsaved values stay in memory, so calling `save` again
    /// retries without re-applying them.
    pub fn save(&self) -> ConfigResult<()> {
        let document = self.write_guard();
        self.persist(&**document)
    }

    /// Runs `f` against a consistent view of the document.
    pub fn read<R>(&self, f: impl FnOnce(&StoreReader<'_>) -> R) -> R {
        let document = self.read_guard();
        f(&StoreReader {
            document: &**document,
        })
    }

    /// Applies the writes in `f` and saves, all under one lock acquisition.
    pub fn update_and_save(&self, f: impl FnOnce(&mut StoreWriter<'_>)) -> ConfigResult<()> {
        let mut document = self.write_guard();
        f(&mut StoreWriter {
            document: &mut document,
        });
        self.persist(&**document)
    }

    pub fn client_id(&self) -> String {
        self.read(|reader| reader.value(CredentialKey::ClientId))
    }

    pub fn set_client_id(&self, value: &str) {
        self.update(|writer| writer.set_value(CredentialKey::ClientId, value));
    }

    pub fn client_secret(&self) -> String {
        self.read(|reader| reader.value(CredentialKey::ClientSecret))
    }

    pub fn set_client_secret(&self, value: &str) {
        self.update(|writer| writer.set_value(CredentialKey::ClientSecret, value));
    }

    pub fn redirect_uri(&self) -> String {
        self.read(|reader| reader.value(CredentialKey::RedirectUri))
    }

    pub fn set_redirect_uri(&self, value: &str) {
        self.update(|writer| writer.set_value(CredentialKey::RedirectUri, value));
    }

    pub fn access_token(&self) -> String {
        self.read(|reader| reader.value(CredentialKey::AccessToken))
    }

    pub fn set_access_token(&self, value: &str) {
        self.update(|writer| writer.set_value(CredentialKey::AccessToken, value));
    }

    pub fn refresh_token(&self) -> String {
        self.read(|reader| reader.value(CredentialKey::RefreshToken))
    }

    pub fn set_refresh_token(&self, value: &str) {
        self.update(|writer| writer.set_value(CredentialKey::RefreshToken, value));
    }

    /// Stored expiration; the minimum instant when none is stored.
    pub fn expiration_date_time(&self) -> ConfigResult<DateTime<FixedOffset>> {
        self.read(|reader| reader.expiration_date_time())
    }

    /// Fails without touching the document when `value` cannot be stored in
    /// the round-trip format.
    pub fn set_expiration_date_time(&self, value: &DateTime<FixedOffset>) -> ConfigResult<()> {
        let formatted = format_round_trip(value)?;
        self.update(|writer| writer.set_value(CredentialKey::ExpirationDateTime, &formatted));
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StoreWriter<'_>)) {
        let mut document = self.write_guard();
        f(&mut StoreWriter {
            document: &mut document,
        });
    }

    fn persist(&self, document: &dyn AttributeDocument) -> ConfigResult<()> {
        document.save(&self.path).map_err(|source| {
            warn!(path = %self.path.display(), error = %source, "Failed to save credential store");
            ConfigError::PersistenceError {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!(path = %self.path.display(), "Saved credential store");
        Ok(())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Box<dyn AttributeDocument>> {
        self.document.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Box<dyn AttributeDocument>> {
        self.document.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Read access held for the duration of [`CredentialStore::read`].
pub struct StoreReader<'a> {
    document: &'a dyn AttributeDocument,
}

impl StoreReader<'_> {
    pub fn get(&self, key: &str) -> String {
        self.document.get(key).unwrap_or_default().to_string()
    }

    pub fn value(&self, key: CredentialKey) -> String {
        self.get(key.attribute())
    }

    pub fn expiration_date_time(&self) -> ConfigResult<DateTime<FixedOffset>> {
        parse_round_trip(&self.value(CredentialKey::ExpirationDateTime))
    }
}

/// Write access held for the duration of [`CredentialStore::update_and_save`].
pub struct StoreWriter<'a> {
    document: &'a mut Box<dyn AttributeDocument>,
}

impl StoreWriter<'_> {
    pub fn set(&mut self, key: &str, value: &str) {
        self.document.set(key, value);
    }

    pub fn set_value(&mut self, key: CredentialKey, value: &str) {
        self.set(key.attribute(), value);
    }

    pub fn set_expiration_date_time(&mut self, value: &DateTime<FixedOffset>) -> ConfigResult<()> {
        self.set_value(CredentialKey::ExpirationDateTime, &format_round_trip(value)?);
        Ok(())
    }
}

/// Holds at most one [`CredentialStore`], created on first successful access.
#[derive(Debug, Default)]
pub struct StoreCell {
    slot: Mutex<Option<Arc<CredentialStore>>>,
}

impl StoreCell {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the stored instance, running `init` if the cell is empty.
    ///
    /// `init` runs while the cell is locked, so it runs at most once across
    /// concurrent callers until it succeeds. Errors are not cached.
    pub fn get_or_try_init<F>(&self, init: F) -> ConfigResult<Arc<CredentialStore>>
    where
        F: FnOnce() -> ConfigResult<CredentialStore>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(init()?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    pub fn get(&self) -> Option<Arc<CredentialStore>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Empties the cell, returning the previous instance.
    pub fn reset(&self) -> Option<Arc<CredentialStore>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
