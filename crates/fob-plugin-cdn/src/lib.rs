//! Rolldown plugin that serves bundled images from a CDN
//!
//! Images referenced by the module graph are uploaded to an object store once
//! the bundle is generated, and every reference to them in emitted scripts is
//! rewritten to the CDN URL. It uses two hooks:
//!
//! - `transform` hook: records which image resources modules reference
//! - `generate_bundle` hook: correlates emitted image assets with those
//!   resources, uploads them and rewrites the scripts
//!
//! ## Architecture
//!
//! ```text
//! Source files → transform() → detect image references → ImageRegistry
//!                                                             ↓
//! Bundle → generate_bundle() → correlate → upload → rewrite scripts → Bundle
//! ```
//!
//! The bundler renames assets when it emits them, so correlation does not
//! rely on filenames alone; see [`matcher`].
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fob_plugin_cdn::{CdnConfig, FobCdnPlugin};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CdnConfig::new()
//!     .with_storage_url("s3://my-assets")
//!     .with_storage_option("region", "eu-west-1")
//!     .with_cdn_url("https://cdn.example.com")
//!     .with_prefix("static/img");
//!
//! // Use with your Rolldown bundler configuration
//! let plugin = Arc::new(FobCdnPlugin::from_config(config)?);
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use parking_lot::Mutex;
use rolldown_common::{ModuleType, Output};
use rolldown_plugin::{
    HookGenerateBundleArgs, HookNoopReturn, HookTransformArgs, HookTransformReturn, HookUsage,
    Plugin, PluginContext, SharedTransformPluginContext,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

mod config;
mod detect;
mod error;
pub mod matcher;
mod publish;
mod registry;
mod report;
pub mod rewrite;
mod storage;

pub use config::{CdnConfig, ConfigDiscovery, StorageConfig, CONFIG_FILE, ENV_PREFIX};
pub use detect::{detect_image_references, ImageReference};
pub use error::{CdnError, Result};
pub use matcher::MatchKind;
pub use publish::Publisher;
pub use registry::{content_type_from_path, ImageEntry, ImageRegistry};
pub use report::{FailedImage, PublishReport, PublishStatus, PublishedImage};
pub use storage::{AssetUploader, ObjectStoreUploader};

/// Rolldown plugin that uploads referenced images and rewrites scripts to CDN URLs
///
/// # Architecture
///
/// The plugin keeps a shared registry of image resources that is populated
/// during the `transform` phase and drained during `generate_bundle`. The
/// report of the last publishing pass stays available through
/// [`FobCdnPlugin::last_report`].
#[derive(Clone, Debug)]
pub struct FobCdnPlugin {
    config: Arc<CdnConfig>,

    uploader: Arc<dyn AssetUploader>,

    /// Image resources seen by the transform hook
    registry: ImageRegistry,

    last_report: Arc<Mutex<Option<PublishReport>>>,

    /// Resolves root-relative specifiers and relative original file names
    root: PathBuf,
}

impl FobCdnPlugin {
    /// Create a plugin with an explicit uploader
    ///
    /// # Example
    ///
    /// ```rust
    /// use fob_plugin_cdn::{CdnConfig, FobCdnPlugin, ObjectStoreUploader};
    /// use std::sync::Arc;
    ///
    /// let config = CdnConfig::new()
    ///     .with_storage_url("memory://")
    ///     .with_cdn_url("https://cdn.example.com");
    /// let plugin = FobCdnPlugin::new(config, Arc::new(ObjectStoreUploader::in_memory()));
    /// assert!(plugin.registry().is_empty());
    /// ```
    pub fn new(config: CdnConfig, uploader: Arc<dyn AssetUploader>) -> Self {
        Self {
            config: Arc::new(config),
            uploader,
            registry: ImageRegistry::new(),
            last_report: Arc::new(Mutex::new(None)),
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Validate the configuration and open the configured object store
    pub fn from_config(config: CdnConfig) -> Result<Self> {
        config.validate()?;
        let uploader = ObjectStoreUploader::from_config(&config)?;
        Ok(Self::new(config, Arc::new(uploader)))
    }

    /// Discover configuration under `root` and use `root` as the project root
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let config = ConfigDiscovery::new(root.as_ref()).load()?;
        Ok(Self::from_config(config)?.with_root(root))
    }

    /// Set the project root
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    pub fn config(&self) -> &CdnConfig {
        &self.config
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    /// Report of the most recent `generate_bundle` pass
    pub fn last_report(&self) -> Option<PublishReport> {
        self.last_report.lock().clone()
    }

    /// Publisher sharing this plugin's configuration, uploader and root
    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.config.clone(), self.uploader.clone(), &self.root)
    }

    /// Record the images a module refers to, returning how many were found
    ///
    /// An image module registers itself. JavaScript and TypeScript modules
    /// register the images their source references. Code is never changed.
    pub fn collect(&self, id: &str, code: &str, module_type: &ModuleType) -> usize {
        if !self.config.enabled {
            return 0;
        }

        if detect::is_image_module(id, &self.config) {
            let resource = detect::module_resource_path(id);
            self.registry
                .register(resource, id.to_string(), id.to_string());
            return 1;
        }

        let is_script = matches!(
            module_type,
            ModuleType::Js | ModuleType::Jsx | ModuleType::Ts | ModuleType::Tsx
        ) || detect::is_script_module(id);
        if !is_script || self.config.is_excluded(id) {
            return 0;
        }

        let references = detect_image_references(code, id, &self.root, &self.config);
        for reference in &references {
            self.registry.register(
                reference.resolved.clone(),
                id.to_string(),
                reference.specifier.clone(),
            );
        }

        if !references.is_empty() {
            debug!("[fob-cdn] Found {} image references in {}", references.len(), id);
        }
        references.len()
    }

    /// Publish the images registered so far and rewrite `bundle`
    ///
    /// The registry is drained first, so the next build starts empty even
    /// when publishing fails. The report is kept for [`Self::last_report`].
    pub async fn process_bundle(&self, bundle: &mut Vec<Output>) -> anyhow::Result<PublishReport> {
        let entries = self.registry.entries();
        self.registry.clear();

        let report = self
            .publisher()
            .publish(entries, bundle)
            .await
            .context("fob-cdn failed to publish images")?;

        *self.last_report.lock() = Some(report.clone());
        Ok(report)
    }
}

impl Plugin for FobCdnPlugin {
    /// Returns the plugin name for debugging and logging
    fn name(&self) -> Cow<'static, str> {
        "fob-cdn".into()
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::Transform | HookUsage::GenerateBundle
    }

    /// Transform hook - records image references, never rewrites modules
    fn transform(
        &self,
        _ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let id = args.id.to_string();
        let code = args.code.to_string();
        let module_type = args.module_type.clone();
        let plugin = self.clone();

        async move {
            plugin.collect(&id, &code, &module_type);
            Ok(None)
        }
    }

    /// Generate bundle hook - uploads images and rewrites scripts
    ///
    /// Runs after all chunks are rendered and before they are written. See
    /// [`FobCdnPlugin::process_bundle`].
    fn generate_bundle(
        &self,
        _ctx: &PluginContext,
        args: &mut HookGenerateBundleArgs<'_>,
    ) -> impl std::future::Future<Output = HookNoopReturn> + Send {
        let plugin = self.clone();

        async move {
            plugin.process_bundle(args.bundle).await?;
            Ok(())
        }
    }
}
