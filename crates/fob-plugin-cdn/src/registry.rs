//! Registry of image resources referenced by the module graph.
//!
//! Populated by the transform hook and drained once per build by the
//! asset-processing hook.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Thread-safe image registry.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    inner: Arc<RwLock<FxHashMap<PathBuf, ImageEntry>>>,
}

/// An image resource seen during the transform phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Absolute, normalized path of the image on disk
    pub resource_path: PathBuf,

    /// Specifier that first referenced the image
    /// Example: "../assets/logo.png"
    pub specifier: String,

    /// Modules that referenced the image, in discovery order
    pub referrers: Vec<String>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image reference.
    ///
    /// Registering a known path only records the referrer, once.
    pub fn register(&self, resource_path: PathBuf, referrer: String, specifier: String) -> ImageEntry {
        let mut inner = self.inner.write();

        let entry = inner
            .entry(resource_path.clone())
            .or_insert_with(|| ImageEntry {
                resource_path,
                specifier,
                referrers: Vec::new(),
            });

        if !entry.referrers.contains(&referrer) {
            entry.referrers.push(referrer);
        }

        entry.clone()
    }

    pub fn get(&self, resource_path: &Path) -> Option<ImageEntry> {
        self.inner.read().get(resource_path).cloned()
    }

    /// All entries, sorted by resource path.
    pub fn entries(&self) -> Vec<ImageEntry> {
        let mut entries: Vec<ImageEntry> = self.inner.read().values().cloned().collect();
        entries.sort_by(|a, b| a.resource_path.cmp(&b.resource_path));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

/// Determine content type from file path.
pub fn content_type_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
