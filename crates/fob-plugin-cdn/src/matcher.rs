//! Correlates emitted image assets with the resources the module graph referenced.
//!
//! The bundler renames assets when it writes them (`logo.png` becomes
//! `assets/logo-Ab12Cd34.png`), so the emitted filename alone rarely equals the
//! resource path. Correlation tries three strategies, strongest first:
//!
//! 1. [`MatchKind::OriginalName`]: the asset records the resource as one of its
//!    original file names.
//! 2. [`MatchKind::ContentDigest`]: the emitted bytes hash to the same blake3
//!    digest as the resource file.
//! 3. [`MatchKind::Fingerprint`]: the emitted stem is the resource stem plus a
//!    hash token, with the same extension.

use path_clean::PathClean;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::registry::ImageEntry;

/// How an emitted asset was tied to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    OriginalName,
    ContentDigest,
    Fingerprint,
}

/// Borrowed view of an emitted image asset.
#[derive(Debug, Clone, Copy)]
pub struct EmittedImage<'a> {
    pub filename: &'a str,
    pub original_file_names: &'a [String],
    pub bytes: &'a [u8],
}

/// A successful correlation.
#[derive(Debug, Clone, Copy)]
pub struct Correlation<'a> {
    pub entry: &'a ImageEntry,
    pub kind: MatchKind,
}

#[derive(Debug)]
struct Candidate {
    entry: ImageEntry,
    stem: String,
    extension: String,
    digest: Option<blake3::Hash>,
}

/// Matches emitted assets against a snapshot of registered images.
#[derive(Debug)]
pub struct AssetMatcher {
    root: PathBuf,
    candidates: Vec<Candidate>,
}

impl AssetMatcher {
    /// Build a matcher, hashing every readable resource once.
    ///
    /// `root` resolves relative original file names.
    pub fn new(entries: Vec<ImageEntry>, root: impl AsRef<Path>) -> Self {
        let candidates = entries
            .into_iter()
            .map(|entry| {
                let (stem, extension) = stem_and_extension(&entry.resource_path);
                let digest = match std::fs::read(&entry.resource_path) {
                    Ok(bytes) => Some(blake3::hash(&bytes)),
                    Err(e) => {
                        debug!(
                            "[fob-cdn] Cannot read {} for digest matching: {}",
                            entry.resource_path.display(),
                            e
                        );
                        None
                    }
                };
                Candidate {
                    entry,
                    stem,
                    extension,
                    digest,
                }
            })
            .collect();

        Self {
            root: root.as_ref().to_path_buf(),
            candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Find the resource an emitted asset came from.
    pub fn correlate(&self, emitted: &EmittedImage<'_>) -> Option<Correlation<'_>> {
        self.by_original_name(emitted)
            .map(|entry| Correlation {
                entry,
                kind: MatchKind::OriginalName,
            })
            .or_else(|| {
                self.by_digest(emitted).map(|entry| Correlation {
                    entry,
                    kind: MatchKind::ContentDigest,
                })
            })
            .or_else(|| {
                self.by_fingerprint(emitted).map(|entry| Correlation {
                    entry,
                    kind: MatchKind::Fingerprint,
                })
            })
    }

    fn by_original_name(&self, emitted: &EmittedImage<'_>) -> Option<&ImageEntry> {
        emitted.original_file_names.iter().find_map(|name| {
            let path = Path::new(name);
            let normalized = if path.is_absolute() {
                path.clean()
            } else {
                self.root.join(path).clean()
            };
            self.candidates
                .iter()
                .find(|c| c.entry.resource_path == normalized)
                .map(|c| &c.entry)
        })
    }

    fn by_digest(&self, emitted: &EmittedImage<'_>) -> Option<&ImageEntry> {
        if emitted.bytes.is_empty() {
            return None;
        }
        let digest = blake3::hash(emitted.bytes);
        self.candidates
            .iter()
            .find(|c| c.digest == Some(digest))
            .map(|c| &c.entry)
    }

    fn by_fingerprint(&self, emitted: &EmittedImage<'_>) -> Option<&ImageEntry> {
        let (emitted_stem, emitted_ext) = stem_and_extension(Path::new(emitted.filename));

        let mut best: Option<&Candidate> = None;
        let mut ambiguous = false;

        for candidate in &self.candidates {
            if candidate.extension != emitted_ext
                || !fingerprint_matches(&emitted_stem, &candidate.stem)
            {
                continue;
            }
            match best {
                Some(current) if current.stem.len() > candidate.stem.len() => {}
                Some(current) if current.stem.len() == candidate.stem.len() => {
                    ambiguous = true;
                }
                _ => {
                    best = Some(candidate);
                    ambiguous = false;
                }
            }
        }

        if ambiguous {
            debug!(
                "[fob-cdn] Ambiguous fingerprint match for {}, leaving it local",
                emitted.filename
            );
            return None;
        }

        best.map(|c| &c.entry)
    }
}

fn stem_and_extension(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    (stem, extension)
}

/// `logo-Ab12Cd34`, `logo.Ab12Cd34` and `logo_Ab12Cd34` all fingerprint `logo`.
fn fingerprint_matches(emitted_stem: &str, resource_stem: &str) -> bool {
    if resource_stem.is_empty() {
        return false;
    }
    if emitted_stem == resource_stem {
        return true;
    }

    let Some(rest) = emitted_stem.strip_prefix(resource_stem) else {
        return false;
    };
    let Some(hash) = rest
        .strip_prefix('-')
        .or_else(|| rest.strip_prefix('.'))
        .or_else(|| rest.strip_prefix('_'))
    else {
        return false;
    };

    hash.len() >= 4
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
