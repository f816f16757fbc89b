//! Rewrites image references in emitted scripts to CDN URLs.
//!
//! Compiled output references an emitted image through a string literal that
//! ends in the emitted filename, optionally behind the public path, `./`, `/`
//! or `../` segments, and optionally followed by a `?query` or `#fragment`.
//! Every such literal is replaced with the CDN URL, keeping the suffix.
//!
//! Emitted images that stay local are recorded in the map too, so a bare
//! basename only falls back to a URL when no local image shares it.
//!
//! ## Limitations
//!
//! The literal scan is lexical. Quotes inside comments and regex literals
//! are paired like any other quote, so the `'` in `// don't` can swallow a
//! real reference later on that line, and a backtick pair can span lines.
//! Rewritten chunks keep their source maps, so columns after a rewritten
//! literal shift by the length difference.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

static STRING_LITERAL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#""([^"\\\r\n]*)"|'([^'\\\r\n]*)'|`([^`\\$]*)`"#).ok()
});

/// Emitted filename to CDN URL mapping for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMap {
    urls: BTreeMap<String, String>,

    /// Emitted images without a URL (unmatched, excluded or failed)
    local: BTreeSet<String>,
}

impl UrlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl AsRef<str>, url: impl Into<String>) {
        let filename = normalize_filename(filename.as_ref());
        self.local.remove(filename);
        self.urls.insert(filename.to_string(), url.into());
    }

    /// Record an emitted image that keeps its local reference.
    pub fn insert_local(&mut self, filename: impl AsRef<str>) {
        let filename = normalize_filename(filename.as_ref());
        if !self.urls.contains_key(filename) {
            self.local.insert(filename.to_string());
        }
    }

    pub fn is_local(&self, filename: &str) -> bool {
        self.local.contains(normalize_filename(filename))
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.urls
            .get(normalize_filename(filename))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Entries ordered by filename.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.urls.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Basename to URL, for basenames that identify exactly one emitted
    /// image and that image has a URL.
    fn unique_basenames(&self) -> FxHashMap<&str, &str> {
        let mapped = self
            .urls
            .iter()
            .map(|(filename, url)| (filename.as_str(), Some(url.as_str())));
        let local = self.local.iter().map(|filename| (filename.as_str(), None));

        let mut seen: FxHashMap<&str, Option<&str>> = FxHashMap::default();
        for (filename, url) in mapped.chain(local) {
            seen.entry(basename(filename))
                .and_modify(|slot| *slot = None)
                .or_insert(url);
        }
        seen.into_iter()
            .filter_map(|(name, url)| url.map(|url| (name, url)))
            .collect()
    }
}

/// Result of rewriting one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub code: String,
    pub replaced: usize,
}

impl Rewrite {
    pub fn changed(&self) -> bool {
        self.replaced > 0
    }
}

/// Replace references to mapped filenames with their CDN URLs.
///
/// # Example
///
/// ```
/// use fob_plugin_cdn::rewrite::{rewrite_references, UrlMap};
///
/// let mut map = UrlMap::new();
/// map.insert("assets/logo-Ab12Cd34.png", "https://cdn.example.com/assets/logo-Ab12Cd34.png");
///
/// let out = rewrite_references(r#"img.src = "./assets/logo-Ab12Cd34.png";"#, &map, None);
/// assert_eq!(out.code, r#"img.src = "https://cdn.example.com/assets/logo-Ab12Cd34.png";"#);
/// assert_eq!(out.replaced, 1);
/// ```
pub fn rewrite_references(code: &str, map: &UrlMap, public_path: Option<&str>) -> Rewrite {
    let unchanged = || Rewrite {
        code: code.to_string(),
        replaced: 0,
    };

    if map.is_empty() {
        return unchanged();
    }
    let Some(re) = STRING_LITERAL.as_ref() else {
        return unchanged();
    };

    let basenames = map.unique_basenames();
    let mut replaced = 0;

    let rewritten = re.replace_all(code, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let Some(literal) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            return whole.to_string();
        };

        match lookup(literal.as_str(), map, &basenames, public_path) {
            Some((url, suffix)) => {
                replaced += 1;
                let quote = &whole[..1];
                format!("{quote}{url}{suffix}{quote}")
            }
            None => whole.to_string(),
        }
    });

    if replaced == 0 {
        return unchanged();
    }

    Rewrite {
        code: rewritten.into_owned(),
        replaced,
    }
}

fn lookup<'m>(
    literal: &str,
    map: &'m UrlMap,
    basenames: &FxHashMap<&str, &'m str>,
    public_path: Option<&str>,
) -> Option<(&'m str, String)> {
    let split = literal.find(['?', '#']).unwrap_or(literal.len());
    let (path, suffix) = literal.split_at(split);
    if path.is_empty() {
        return None;
    }

    let mut relative = path;
    if let Some(pp) = public_path.filter(|pp| !pp.is_empty()) {
        relative = relative.strip_prefix(pp).unwrap_or(relative);
    }
    let relative = strip_relative_prefix(relative);

    if let Some(url) = map.get(relative) {
        return Some((url, suffix.to_string()));
    }
    if map.is_local(relative) {
        return None;
    }

    if relative.contains("://") || path.starts_with("//") || path.starts_with("data:") {
        return None;
    }

    basenames
        .get(basename(relative))
        .map(|url| (*url, suffix.to_string()))
}

fn strip_relative_prefix(mut path: &str) -> &str {
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix("../") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            return path;
        }
    }
}

fn normalize_filename(filename: &str) -> &str {
    strip_relative_prefix(filename)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGO: &str = "assets/logo-Ab12Cd34.png";
    const LOGO_URL: &str = "https://cdn.example.com/img/assets/logo-Ab12Cd34.png";

    fn map() -> UrlMap {
        let mut map = UrlMap::new();
        map.insert(LOGO, LOGO_URL);
        map
    }

    #[test]
    fn test_rewrites_all_quote_styles() {
        let code = r#"a("assets/logo-Ab12Cd34.png"); b('assets/logo-Ab12Cd34.png'); c(`assets/logo-Ab12Cd34.png`);"#;
        let out = rewrite_references(code, &map(), None);
        assert_eq!(out.replaced, 3);
        assert_eq!(
            out.code,
            format!(r#"a("{LOGO_URL}"); b('{LOGO_URL}'); c(`{LOGO_URL}`);"#)
        );
    }

    #[test]
    fn test_rewrites_new_url_pattern() {
        let code = r#"const u = new URL("./assets/logo-Ab12Cd34.png", import.meta.url).href;"#;
        let out = rewrite_references(code, &map(), None);
        assert_eq!(
            out.code,
            format!(r#"const u = new URL("{LOGO_URL}", import.meta.url).href;"#)
        );
    }

    #[test]
    fn test_prefixes_and_suffixes() {
        let code = r#"["/assets/logo-Ab12Cd34.png", "../assets/logo-Ab12Cd34.png?v=2", "/static/assets/logo-Ab12Cd34.png#x"]"#;
        let out = rewrite_references(code, &map(), Some("/static/"));
        assert_eq!(out.replaced, 3);
        assert_eq!(
            out.code,
            format!(r#"["{LOGO_URL}", "{LOGO_URL}?v=2", "{LOGO_URL}#x"]"#)
        );
    }

    #[test]
    fn test_unique_basename_fallback() {
        let code = r#"img("media/logo-Ab12Cd34.png"); ext("https://other.example.com/logo-Ab12Cd34.png");"#;
        let out = rewrite_references(code, &map(), None);
        assert_eq!(out.replaced, 1);
        assert!(out.code.contains(&format!(r#"img("{LOGO_URL}")"#)));
        assert!(out.code.contains("https://other.example.com/logo-Ab12Cd34.png"));
    }

    #[test]
    fn test_duplicate_basenames_need_full_path() {
        let mut map = map();
        map.insert("other/logo-Ab12Cd34.png", "https://cdn.example.com/other.png");

        let out = rewrite_references(r#"x("media/logo-Ab12Cd34.png")"#, &map, None);
        assert!(!out.changed());

        let out = rewrite_references(r#"x("other/logo-Ab12Cd34.png")"#, &map, None);
        assert_eq!(out.code, r#"x("https://cdn.example.com/other.png")"#);
    }

    #[test]
    fn test_local_images_block_basename_fallback() {
        let mut map = map();
        map.insert_local("other/logo-Ab12Cd34.png");

        let code = r#"a("other/logo-Ab12Cd34.png"); b("logo-Ab12Cd34.png"); c("assets/logo-Ab12Cd34.png");"#;
        let out = rewrite_references(code, &map, None);
        assert_eq!(out.replaced, 1);
        assert_eq!(
            out.code,
            format!(r#"a("other/logo-Ab12Cd34.png"); b("logo-Ab12Cd34.png"); c("{LOGO_URL}");"#)
        );
    }

    #[test]
    fn test_comment_quotes_stay_on_their_line() {
        let code = "// don't inline\nimg.src = \"assets/logo-Ab12Cd34.png\";";
        let out = rewrite_references(code, &map(), None);
        assert_eq!(out.replaced, 1);
        assert_eq!(out.code, format!("// don't inline\nimg.src = \"{LOGO_URL}\";"));
    }

    #[test]
    fn test_insert_overrides_local() {
        let mut map = UrlMap::new();
        map.insert_local("assets/a.png");
        map.insert("assets/a.png", "https://cdn/a.png");
        map.insert_local("./assets/a.png");

        assert!(!map.is_local("assets/a.png"));
        assert_eq!(map.get("assets/a.png"), Some("https://cdn/a.png"));
    }

    #[test]
    fn test_unrelated_code_untouched() {
        let code = r#"const s = "logo.png"; const t = 'assets/other.png'; const e = "";"#;
        let out = rewrite_references(code, &map(), None);
        assert!(!out.changed());
        assert_eq!(out.code, code);

        let out = rewrite_references(code, &UrlMap::new(), None);
        assert_eq!(out.code, code);
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let code = r#"a("assets/logo-Ab12Cd34.png"); b("assets/logo-Ab12Cd34.png");"#;
        let first = rewrite_references(code, &map(), None);
        let second = rewrite_references(code, &map(), None);
        assert_eq!(first, second);
        assert_eq!(rewrite_references(&first.code, &map(), None).replaced, 0);
    }

    #[test]
    fn test_url_map_normalizes_keys() {
        let mut map = UrlMap::new();
        map.insert("./assets/a.png", "https://cdn/a.png");
        assert_eq!(map.get("assets/a.png"), Some("https://cdn/a.png"));
        assert_eq!(map.get("/assets/a.png"), Some("https://cdn/a.png"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().next(), Some(("assets/a.png", "https://cdn/a.png")));
    }
}
