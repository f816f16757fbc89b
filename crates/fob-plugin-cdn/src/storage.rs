//! Upload seam between the plugin and the cloud SDK.
//!
//! [`AssetUploader`] is the only thing the publisher needs from a store. The
//! default implementation wraps an `object_store` backend, so S3, GCS, Azure,
//! the local filesystem and an in-memory store all work from a URL.

use async_trait::async_trait;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload,
};
use std::sync::Arc;
use tracing::debug;

use crate::config::CdnConfig;
use crate::error::{CdnError, Result};

/// Destination for uploaded images.
#[async_trait]
pub trait AssetUploader: Send + Sync + std::fmt::Debug {
    /// Whether an object already exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Store `bytes` under `key`.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
}

/// [`AssetUploader`] backed by an `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,

    /// Path inside the store taken from the storage URL (`s3://bucket/base`)
    base: ObjectPath,

    cache_control: Option<String>,

    /// The local filesystem store rejects object attributes
    attributes: bool,
}

impl ObjectStoreUploader {
    /// Wrap an existing store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            base: ObjectPath::default(),
            cache_control: None,
            attributes: true,
        }
    }

    /// Open the store named by `storage.url` with `storage.options`.
    pub fn from_config(config: &CdnConfig) -> Result<Self> {
        let raw = config.storage.url.as_str();
        let url = url::Url::parse(raw)
            .map_err(|e| CdnError::invalid_config("storage.url", e.to_string()))?;

        let (store, base) = object_store::parse_url_opts(&url, config.storage.options.iter())
            .map_err(|e| CdnError::store_unavailable(raw, e))?;

        debug!("[fob-cdn] Opened object store {} (base: '{}')", raw, base);

        Ok(Self {
            store: Arc::from(store),
            base,
            cache_control: config.cache_control.clone(),
            attributes: url.scheme() != "file",
        })
    }

    /// In-memory store, used for tests and dry runs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// The wrapped store.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    /// Full location of `key` inside the store.
    pub fn location(&self, key: &str) -> ObjectPath {
        let base = self.base.as_ref();
        if base.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", base, key))
        }
    }

    fn put_options(&self, content_type: &str) -> PutOptions {
        let mut attributes = Attributes::new();
        if self.attributes {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
            if let Some(cache_control) = &self.cache_control {
                attributes.insert(
                    Attribute::CacheControl,
                    AttributeValue::from(cache_control.clone()),
                );
            }
        }

        PutOptions {
            attributes,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AssetUploader for ObjectStoreUploader {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&self.location(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(CdnError::head_failed(key, e)),
        }
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let location = self.location(key);
        let size = bytes.len();

        self.store
            .put_opts(&location, PutPayload::from(bytes), self.put_options(content_type))
            .await
            .map_err(|e| CdnError::upload_failed(key, e))?;

        debug!("[fob-cdn] Uploaded {} ({} bytes, {})", location, size, content_type);
        Ok(())
    }
}
