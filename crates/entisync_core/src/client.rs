//! Client context.

use crate::config::{ClientConfig, RepositoryConfig};
use crate::error::{CoreError, CoreResult};
use crate::record::RecordMapper;
use crate::repository::Repository;
use entisync_codec::Value;
use entisync_storage::{MetaValue, Storage};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Entry point of an application's sync layer.
///
/// A client owns one storage and hands out at most one repository per name.
/// There is no global instance; applications pass the client (or the
/// repositories it created) to whoever needs them.
pub struct Client {
    storage: Arc<dyn Storage>,
    config: ClientConfig,
    repositories: Mutex<BTreeSet<String>>,
    closed: AtomicBool,
}

impl Client {
    /// Opens the storage and, if configured, switches to the namespace.
    pub async fn open(storage: Arc<dyn Storage>, config: ClientConfig) -> CoreResult<Self> {
        storage.init().await?;
        if let Some(namespace) = &config.namespace {
            if storage.namespace() != *namespace {
                storage.switch_namespace(namespace).await?;
            }
        }
        info!(namespace = %storage.namespace(), "client opened");

        Ok(Self {
            storage,
            config,
            repositories: Mutex::new(BTreeSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Creates the repository `name` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name is empty or already taken.
    pub fn repository<T>(
        &self,
        name: &str,
        mapper: RecordMapper<T>,
    ) -> CoreResult<Arc<Repository<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.repository_with_config(name, mapper, RepositoryConfig::default())
    }

    /// Creates the repository `name`.
    pub fn repository_with_config<T>(
        &self,
        name: &str,
        mapper: RecordMapper<T>,
        config: RepositoryConfig,
    ) -> CoreResult<Arc<Repository<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.check_open()?;
        if name.is_empty() {
            return Err(CoreError::validation("repository name must not be empty"));
        }
        if !self.repositories.lock().insert(name.to_string()) {
            return Err(CoreError::validation(format!(
                "repository {name} is already registered"
            )));
        }

        info!(repository = %name, id_field = %config.id_field, "repository registered");
        Ok(Arc::new(Repository::new(
            name,
            Arc::clone(&self.storage),
            mapper,
            config,
        )))
    }

    /// Returns the registered repository names in ascending order.
    pub fn repository_names(&self) -> Vec<String> {
        self.repositories.lock().iter().cloned().collect()
    }

    /// Returns the storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Returns the configuration the client was opened with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the active namespace.
    pub fn namespace(&self) -> String {
        self.storage.namespace()
    }

    /// Switches every repository to another namespace.
    ///
    /// Open watch streams re-emit with the new namespace's data.
    pub async fn switch_namespace(&self, namespace: &str) -> CoreResult<()> {
        self.check_open()?;
        self.storage.switch_namespace(namespace).await?;
        Ok(())
    }

    /// Reads a metadata entry of the active namespace.
    pub async fn get_meta(&self, key: &str) -> CoreResult<Option<MetaValue>> {
        self.check_open()?;
        Ok(self.storage.get_meta(key).await?)
    }

    /// Writes a metadata entry of the active namespace.
    pub async fn set_meta(&self, key: &str, value: impl Into<MetaValue>) -> CoreResult<()> {
        self.check_open()?;
        self.storage.set_meta(key, value.into()).await?;
        Ok(())
    }

    /// Writes a metadata entry from a dynamic value.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidMetaValue` for nulls, maps and non-text lists.
    pub async fn set_meta_value(&self, key: &str, value: Value) -> CoreResult<()> {
        let meta = MetaValue::try_from(value)?;
        self.set_meta(key, meta).await
    }

    /// Removes a metadata entry, returning whether it existed.
    pub async fn remove_meta(&self, key: &str) -> CoreResult<bool> {
        self.check_open()?;
        Ok(self.storage.remove_meta(key).await?)
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Ends every watch stream and closes the storage.
    ///
    /// Repositories obtained earlier fail with a storage error afterwards.
    pub async fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.storage.close().await?;
        self.repositories.lock().clear();
        info!("client closed");
        Ok(())
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::Closed)
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("namespace", &self.storage.namespace())
            .field("repositories", &self.repository_names())
            .field("open", &self.is_open())
            .finish()
    }
}
