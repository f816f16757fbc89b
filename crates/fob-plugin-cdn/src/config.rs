//! CDN plugin configuration
//!
//! Configuration is layered with figment: built-in defaults, then a config
//! file, then `FOB_CDN_*` environment variables. Nested keys in the
//! environment are separated by `__`, e.g. `FOB_CDN_STORAGE__URL`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CdnError, Result};

/// Dedicated config file name
pub const CONFIG_FILE: &str = "fob-cdn.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FOB_CDN_";

/// Object store location and provider options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store URL: `s3://bucket`, `gs://bucket`, `az://container`,
    /// `file:///abs/dir` or `memory://`
    pub url: String,

    /// Provider options (region, endpoint, credentials, ...)
    pub options: BTreeMap<String, String>,
}

/// Configuration for the CDN plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    /// Plugin does nothing when disabled
    pub enabled: bool,

    pub storage: StorageConfig,

    /// Public base URL serving the uploaded keys
    pub cdn_url: String,

    /// Key folder prepended to every object key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Image extensions handled by the plugin (without the dot)
    pub extensions: Vec<String>,

    /// Emitted asset extensions whose content is rewritten. Chunks are always rewritten.
    pub script_extensions: Vec<String>,

    /// Public path the host prepends to emitted filenames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    /// Substring patterns of resources and assets to ignore
    pub exclude: Vec<String>,

    /// Keep uploaded images in the local output
    pub emit_local: bool,

    /// Skip uploading keys that already exist in the store
    pub skip_existing: bool,

    /// Compute URLs and rewrite scripts without uploading
    pub dry_run: bool,

    /// Abort the build on the first upload failure
    pub fail_on_error: bool,

    /// Cache-Control attribute attached to uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,

    /// File name of a JSON manifest added to the bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            cdn_url: String::new(),
            prefix: None,
            extensions: ["png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            script_extensions: ["js", "mjs", "cjs"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            public_path: None,
            exclude: Vec::new(),
            emit_local: true,
            skip_existing: false,
            dry_run: false,
            fail_on_error: false,
            cache_control: None,
            manifest: None,
        }
    }
}

impl CdnConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file, layered over defaults and under `FOB_CDN_*` variables
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CdnError::config_not_found(vec![path.to_path_buf()]));
        }
        layered(Toml::file(path))
    }

    /// Create from a JSON value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use fob_plugin_cdn::CdnConfig;
    /// use serde_json::json;
    ///
    /// let config = CdnConfig::from_value(json!({
    ///     "storage": { "url": "s3://assets" },
    ///     "cdn_url": "https://cdn.example.com"
    /// }))
    /// .unwrap();
    /// assert_eq!(config.storage.url, "s3://assets");
    /// assert!(config.emit_local);
    /// ```
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| CdnError::invalid_config("config", e.to_string()))
    }

    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage.url = url.into();
        self
    }

    pub fn with_storage_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage.options.insert(key.into(), value.into());
        self
    }

    pub fn with_cdn_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_url = url.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = Some(public_path.into());
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn with_emit_local(mut self, enabled: bool) -> Self {
        self.emit_local = enabled;
        self
    }

    pub fn with_skip_existing(mut self, enabled: bool) -> Self {
        self.skip_existing = enabled;
        self
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn with_fail_on_error(mut self, enabled: bool) -> Self {
        self.fail_on_error = enabled;
        self
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn with_manifest(mut self, filename: impl Into<String>) -> Self {
        self.manifest = Some(filename.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check that an enabled configuration can publish
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.storage.url.trim().is_empty() {
            return Err(CdnError::invalid_config(
                "storage.url",
                "set an object store URL such as s3://my-bucket",
            ));
        }
        url::Url::parse(&self.storage.url)
            .map_err(|e| CdnError::invalid_config("storage.url", e.to_string()))?;

        if self.cdn_url.trim().is_empty() {
            return Err(CdnError::invalid_config(
                "cdn_url",
                "set the public base URL serving uploaded images",
            ));
        }
        url::Url::parse(&self.cdn_url)
            .map_err(|e| CdnError::invalid_config("cdn_url", e.to_string()))?;

        if self.extensions.is_empty() {
            return Err(CdnError::invalid_config(
                "extensions",
                "at least one image extension is required",
            ));
        }

        Ok(())
    }

    /// Object key for an emitted filename
    pub fn object_key(&self, filename: &str) -> String {
        let filename = filename.trim_start_matches("./").trim_start_matches('/');
        match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, filename),
            _ => filename.to_string(),
        }
    }

    /// Public URL for an object key
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.cdn_url.trim_end_matches('/'), key)
    }

    /// Whether a path or module id has one of the configured image extensions
    pub fn is_image(&self, path: &str) -> bool {
        has_extension(path, &self.extensions)
    }

    /// Whether an emitted asset holds script code to rewrite
    pub fn is_script(&self, path: &str) -> bool {
        has_extension(path, &self.script_extensions)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude
            .iter()
            .any(|pattern| !pattern.is_empty() && path.contains(pattern.as_str()))
    }
}

/// Strip a `?query` or `#fragment` suffix
pub(crate) fn strip_suffix(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

fn has_extension(path: &str, extensions: &[String]) -> bool {
    let path = strip_suffix(path);
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn layered(file: impl Provider) -> Result<CdnConfig> {
    Figment::from(Serialized::defaults(CdnConfig::default()))
        .merge(file)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(CdnError::config_load)
}

/// File-based configuration discovery
///
/// Searches, in order:
/// 1. `fob-cdn.toml`
/// 2. the `[cdn]` table of `fob.toml`
/// 3. the `cdn` field of `package.json`
///
/// # Example
///
/// ```no_run
/// use fob_plugin_cdn::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        vec![
            self.root.join(CONFIG_FILE),
            self.root.join("fob.toml"),
            self.root.join("package.json"),
        ]
    }

    /// Find the file holding the CDN configuration
    pub fn find(&self) -> Option<PathBuf> {
        let dedicated = self.root.join(CONFIG_FILE);
        if dedicated.exists() {
            return Some(dedicated);
        }

        let fob_toml = self.root.join("fob.toml");
        if let Ok(content) = fs::read_to_string(&fob_toml) {
            if let Ok(parsed) = toml::from_str::<toml::Value>(&content) {
                if parsed.get("cdn").is_some() {
                    return Some(fob_toml);
                }
            }
        }

        let pkg = self.root.join("package.json");
        if let Ok(content) = fs::read_to_string(&pkg) {
            if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
                if parsed.get("cdn").is_some_and(|v| !v.is_null()) {
                    return Some(pkg);
                }
            }
        }

        None
    }

    /// Load the discovered configuration
    ///
    /// # Errors
    ///
    /// Returns `CdnError::ConfigNotFound` when no candidate holds CDN settings.
    pub fn load(&self) -> Result<CdnConfig> {
        let path = self
            .find()
            .ok_or_else(|| CdnError::config_not_found(self.candidates()))?;
        debug!("[fob-cdn] Loading config from {}", path.display());

        match path.file_name().and_then(|n| n.to_str()) {
            Some("fob.toml") => layered(Figment::from(Toml::file(&path)).focus("cdn")),
            Some("package.json") => {
                let content = fs::read_to_string(&path)?;
                let parsed: Value = serde_json::from_str(&content)
                    .map_err(|e| CdnError::invalid_config("package.json", e.to_string()))?;
                let cdn = parsed.get("cdn").cloned().unwrap_or(Value::Null);
                layered(Serialized::defaults(cdn))
            }
            _ => CdnConfig::load(&path),
        }
    }
}
