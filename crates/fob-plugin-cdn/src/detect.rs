//! Image reference detection for the transform hook.
//!
//! Finds image specifiers in JavaScript/TypeScript source and resolves them to
//! absolute paths. Detection is regex based and only looks at string
//! specifiers, so computed paths are not seen.

use once_cell::sync::Lazy;
use path_clean::PathClean;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::config::{strip_suffix, CdnConfig};

static REFERENCE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // new URL('./logo.png', import.meta.url)
        r#"new\s+URL\s*\(\s*['"`]([^'"`]+)['"`]\s*,\s*import\.meta\.url\s*\)"#,
        // import logo from './logo.png' / export { default } from './logo.png'
        r#"(?:import|export)\s[\w\s{},*$]*?\bfrom\s*['"]([^'"]+)['"]"#,
        // import './logo.png'
        r#"\bimport\s+['"]([^'"]+)['"]"#,
        // import('./logo.png') / require('./logo.png')
        r#"\b(?:import|require)\s*\(\s*['"`]([^'"`]+)['"`]\s*\)"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// A resolved image reference found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub specifier: String,
    pub resolved: PathBuf,
}

/// Whether the module being transformed is itself an image.
pub fn is_image_module(id: &str, config: &CdnConfig) -> bool {
    config.is_image(id) && !config.is_excluded(id)
}

/// Whether a module id is JavaScript or TypeScript source.
pub fn is_script_module(id: &str) -> bool {
    Path::new(strip_suffix(id))
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext,
                "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "mts" | "cts"
            )
        })
        .unwrap_or(false)
}

/// Find image references in module source.
///
/// Relative specifiers resolve against the module's directory, root-relative
/// ones (`/img/logo.png`) against `root`. Bare package specifiers are skipped.
/// Each resolved path appears once, in source order.
pub fn detect_image_references(
    code: &str,
    module_id: &str,
    root: &Path,
    config: &CdnConfig,
) -> Vec<ImageReference> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for re in REFERENCE_PATTERNS.iter() {
        for cap in re.captures_iter(code) {
            if let Some(m) = cap.get(1) {
                if config.is_image(m.as_str()) {
                    found.push((m.start(), m.as_str().to_string()));
                }
            }
        }
    }
    found.sort_by_key(|(offset, _)| *offset);

    let mut references: Vec<ImageReference> = Vec::new();
    for (_, specifier) in found {
        let Some(resolved) = resolve_specifier(&specifier, module_id, root) else {
            continue;
        };
        if config.is_excluded(&resolved.to_string_lossy()) {
            continue;
        }
        if references.iter().any(|r| r.resolved == resolved) {
            continue;
        }
        references.push(ImageReference {
            specifier,
            resolved,
        });
    }

    references
}

/// Resolve a specifier to a normalized absolute path.
pub fn resolve_specifier(specifier: &str, module_id: &str, root: &Path) -> Option<PathBuf> {
    let path = strip_suffix(specifier);

    if path.starts_with("./") || path.starts_with("../") {
        let module_dir = Path::new(strip_suffix(module_id)).parent()?;
        return Some(module_dir.join(path).clean());
    }

    if let Some(rooted) = path.strip_prefix('/') {
        return Some(root.join(rooted).clean());
    }

    None
}

/// Normalize a module id that is itself an image.
pub fn module_resource_path(id: &str) -> PathBuf {
    PathBuf::from(strip_suffix(id)).clean()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CdnConfig {
        CdnConfig::new()
            .with_storage_url("memory://")
            .with_cdn_url("https://cdn.example.com")
    }

    fn resolved(refs: &[ImageReference]) -> Vec<String> {
        refs.iter()
            .map(|r| r.resolved.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_detect_new_url_pattern() {
        let code = r#"
            const logo = new URL('./logo.png', import.meta.url);
            const wasm = new URL('./module.wasm', import.meta.url);
        "#;

        let refs = detect_image_references(code, "/app/src/index.js", Path::new("/app"), &config());
        assert_eq!(resolved(&refs), vec!["/app/src/logo.png"]);
        assert_eq!(refs[0].specifier, "./logo.png");
    }

    #[test]
    fn test_detect_imports_and_requires() {
        let code = r#"
            import hero from "../assets/hero.jpg";
            import { default as icon } from './icons/icon.svg?raw';
            export { default as banner } from './banner.webp';
            import './side-effect.gif';
            const lazy = import('./lazy.avif');
            const legacy = require("./legacy.png");
            import helper from './helper.js';
        "#;

        let refs = detect_image_references(code, "/app/src/pages/home.tsx", Path::new("/app"), &config());
        assert_eq!(
            resolved(&refs),
            vec![
                "/app/src/assets/hero.jpg",
                "/app/src/pages/icons/icon.svg",
                "/app/src/pages/banner.webp",
                "/app/src/pages/side-effect.gif",
                "/app/src/pages/lazy.avif",
                "/app/src/pages/legacy.png",
            ]
        );
    }

    #[test]
    fn test_root_relative_and_bare_specifiers() {
        let code = r#"
            const a = new URL('/public/img/a.png', import.meta.url);
            import b from 'some-package/b.png';
        "#;

        let refs = detect_image_references(code, "/app/src/index.js", Path::new("/app"), &config());
        assert_eq!(resolved(&refs), vec!["/app/public/img/a.png"]);
    }

    #[test]
    fn test_duplicates_and_exclusions() {
        let code = r#"
            import a from './logo.png';
            import b from './../src/logo.png';
            import c from './vendor/skip.png';
        "#;

        let config = config().exclude("/vendor/");
        let refs = detect_image_references(code, "/app/src/index.js", Path::new("/app"), &config);
        assert_eq!(resolved(&refs), vec!["/app/src/logo.png"]);
    }

    #[test]
    fn test_no_false_positives() {
        let code = r#"
            const text = "logo.png is great";
            const url = new URL('https://example.com/logo.png');
            const other = new SomeClass('./file.png', import.meta.url);
        "#;

        let refs = detect_image_references(code, "/app/src/index.js", Path::new("/app"), &config());
        assert!(refs.is_empty());
    }

    #[test]
    fn test_module_checks() {
        let config = config().exclude("node_modules");
        assert!(is_image_module("/app/src/logo.png?url", &config));
        assert!(!is_image_module("/app/node_modules/x/logo.png", &config));
        assert!(!is_image_module("/app/src/index.ts", &config));

        assert!(is_script_module("/app/src/index.ts"));
        assert!(is_script_module("/app/src/App.jsx?v=1"));
        assert!(!is_script_module("/app/src/logo.png"));

        assert_eq!(
            module_resource_path("/app/src/./img/../logo.png?url"),
            PathBuf::from("/app/src/logo.png")
        );
    }
}
