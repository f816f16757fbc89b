//! Asset-processing pass: upload correlated images and rewrite scripts.
//!
//! ```text
//! bundle assets → correlate with registry → upload (sequential) → UrlMap
//!                                                                    ↓
//! bundle chunks + script assets ← rewrite string literals ←──────────┘
//! ```

use rolldown_common::{Output, OutputAsset};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CdnConfig;
use crate::error::{CdnError, Result};
use crate::matcher::{AssetMatcher, EmittedImage};
use crate::registry::{content_type_from_path, ImageEntry};
use crate::report::{FailedImage, PublishReport, PublishStatus, PublishedImage};
use crate::rewrite::{rewrite_references, UrlMap};
use crate::storage::AssetUploader;

/// Runs one publishing pass over a generated bundle.
#[derive(Debug, Clone)]
pub struct Publisher {
    config: Arc<CdnConfig>,
    uploader: Arc<dyn AssetUploader>,
    root: PathBuf,
}

impl Publisher {
    pub fn new(
        config: Arc<CdnConfig>,
        uploader: Arc<dyn AssetUploader>,
        root: impl AsRef<Path>,
    ) -> Self {
        Self {
            config,
            uploader,
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Upload the images `entries` refer to and point scripts at their URLs.
    ///
    /// Uploads run one at a time. A failed upload is logged and reported and
    /// its references stay local, unless `fail_on_error` is set.
    pub async fn publish(
        &self,
        entries: Vec<ImageEntry>,
        bundle: &mut Vec<Output>,
    ) -> Result<PublishReport> {
        let mut report = PublishReport::default();
        if !self.config.enabled {
            debug!("[fob-cdn] Disabled, leaving bundle untouched");
            return Ok(report);
        }

        let matcher = AssetMatcher::new(entries, &self.root);
        let mut urls = UrlMap::new();

        for output in bundle.iter() {
            let Output::Asset(asset) = output else {
                continue;
            };
            let filename = asset.filename.as_str();
            if !self.config.is_image(filename) || self.config.is_excluded(filename) {
                continue;
            }

            let bytes = asset.source.as_bytes();
            let emitted = EmittedImage {
                filename,
                original_file_names: &asset.original_file_names,
                bytes,
            };

            let Some(correlation) = matcher.correlate(&emitted) else {
                debug!("[fob-cdn] {} is not referenced by any module, skipping", filename);
                report.unmatched.push(filename.to_string());
                continue;
            };

            let key = self.config.object_key(filename);
            let url = self.config.public_url(&key);

            let status = match self.transfer(&key, filename, bytes).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("[fob-cdn] Upload of {} failed: {}", filename, e);
                    if self.config.fail_on_error {
                        return Err(e);
                    }
                    report.failed.push(FailedImage {
                        filename: filename.to_string(),
                        key,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            debug!(
                "[fob-cdn] {} → {} ({:?}, matched by {:?})",
                filename, url, status, correlation.kind
            );

            urls.insert(filename, url.clone());
            report.published.push(PublishedImage {
                filename: filename.to_string(),
                resource_path: correlation.entry.resource_path.clone(),
                key,
                url,
                matched_by: correlation.kind,
                status,
            });
        }

        if !urls.is_empty() {
            for output in bundle.iter() {
                if let Output::Asset(asset) = output {
                    if self.config.is_image(asset.filename.as_str()) {
                        urls.insert_local(asset.filename.as_str());
                    }
                }
            }
            self.rewrite_scripts(bundle, &urls, &mut report);
        }

        if !self.config.emit_local {
            report.removed = remove_stored_images(bundle, &report.published);
        }

        if let Some(name) = &self.config.manifest {
            bundle.push(manifest_asset(name, &urls)?);
        }

        info!(
            "[fob-cdn] Published {} images ({} uploaded, {} existing, {} planned, {} failed), rewrote {} references in {} files",
            report.published.len(),
            report.uploaded(),
            report.existing(),
            report.planned(),
            report.failed.len(),
            report.rewritten_references,
            report.rewritten_files.len()
        );

        Ok(report)
    }

    async fn transfer(&self, key: &str, filename: &str, bytes: &[u8]) -> Result<PublishStatus> {
        if self.config.dry_run {
            return Ok(PublishStatus::Planned);
        }

        if self.config.skip_existing && self.uploader.exists(key).await? {
            return Ok(PublishStatus::Existing);
        }

        let content_type = content_type_from_path(Path::new(filename));
        self.uploader.upload(key, bytes.to_vec(), content_type).await?;
        Ok(PublishStatus::Uploaded)
    }

    fn rewrite_scripts(&self, bundle: &mut [Output], urls: &UrlMap, report: &mut PublishReport) {
        let public_path = self.config.public_path.as_deref();

        for output in bundle.iter_mut() {
            match output {
                Output::Chunk(chunk) => {
                    let rewrite = rewrite_references(&chunk.code, urls, public_path);
                    if rewrite.changed() {
                        report.rewritten_references += rewrite.replaced;
                        report.rewritten_files.push(chunk.filename.to_string());
                        Arc::make_mut(chunk).code = rewrite.code;
                    }
                }
                Output::Asset(asset) if self.config.is_script(asset.filename.as_str()) => {
                    let Ok(code) = std::str::from_utf8(asset.source.as_bytes()) else {
                        continue;
                    };
                    let rewrite = rewrite_references(code, urls, public_path);
                    if rewrite.changed() {
                        report.rewritten_references += rewrite.replaced;
                        report.rewritten_files.push(asset.filename.to_string());
                        *asset = Arc::new(OutputAsset {
                            names: asset.names.clone(),
                            original_file_names: asset.original_file_names.clone(),
                            filename: asset.filename.clone(),
                            source: rewrite.code.into(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
}

/// Drop uploaded or already stored images from the local output.
///
/// Planned images were never uploaded, so their local copy is kept.
fn remove_stored_images(bundle: &mut Vec<Output>, published: &[PublishedImage]) -> Vec<String> {
    let stored: FxHashSet<&str> = published
        .iter()
        .filter(|p| p.status != PublishStatus::Planned)
        .map(|p| p.filename.as_str())
        .collect();

    let mut removed = Vec::new();
    if stored.is_empty() {
        return removed;
    }
    bundle.retain(|output| match output {
        Output::Asset(asset) if stored.contains(asset.filename.as_str()) => {
            removed.push(asset.filename.to_string());
            false
        }
        _ => true,
    });
    removed
}

fn manifest_asset(name: &str, urls: &UrlMap) -> Result<Output> {
    let entries: BTreeMap<&str, &str> = urls.iter().collect();
    let json = serde_json::to_string_pretty(&entries).map_err(CdnError::manifest)?;

    Ok(Output::Asset(Arc::new(OutputAsset {
        names: vec![],
        original_file_names: vec![],
        filename: name.to_string().into(),
        source: json.into(),
    })))
}
