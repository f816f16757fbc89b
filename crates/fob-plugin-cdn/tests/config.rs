//! Config discovery and layering tests
//!
//! Tests touching `FOB_CDN_*` variables run serially since the environment is
//! shared by the whole test binary.

use fob_plugin_cdn::{CdnConfig, CdnError, ConfigDiscovery, FobCdnPlugin, CONFIG_FILE};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

const DEDICATED: &str = r#"
cdn_url = "https://cdn.example.com"
prefix = "static/img"
cache_control = "public, max-age=31536000, immutable"

[storage]
url = "memory://"
"#;

#[test]
#[serial]
fn test_dedicated_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), DEDICATED).unwrap();

    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    assert_eq!(config.storage.url, "memory://");
    assert_eq!(config.prefix.as_deref(), Some("static/img"));
    assert_eq!(config.public_url(&config.object_key("a.png")), "https://cdn.example.com/static/img/a.png");
    // Unset fields keep their defaults
    assert!(config.emit_local);
    assert!(config.is_image("a.webp"));
}

#[test]
#[serial]
fn test_dedicated_file_wins_over_fob_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), DEDICATED).unwrap();
    fs::write(
        dir.path().join("fob.toml"),
        "[cdn]\ncdn_url = \"https://other.example.com\"\n",
    )
    .unwrap();

    let discovery = ConfigDiscovery::new(dir.path());
    assert_eq!(discovery.find(), Some(dir.path().join(CONFIG_FILE)));
}

#[test]
#[serial]
fn test_fob_toml_cdn_table() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("fob.toml"),
        r#"
[bundle]
entry = "src/index.ts"

[cdn]
cdn_url = "https://cdn.example.com"
dry_run = true

[cdn.storage]
url = "s3://assets"
options = { region = "eu-west-1" }
"#,
    )
    .unwrap();

    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    assert!(config.dry_run);
    assert_eq!(config.storage.url, "s3://assets");
    assert_eq!(config.storage.options.get("region").map(String::as_str), Some("eu-west-1"));
}

#[test]
#[serial]
fn test_fob_toml_without_cdn_table_is_skipped() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("fob.toml"), "[bundle]\nentry = \"a.js\"\n").unwrap();

    assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    let err = ConfigDiscovery::new(dir.path()).load().unwrap_err();
    assert!(matches!(err, CdnError::ConfigNotFound { .. }));
}

#[test]
#[serial]
fn test_package_json_cdn_field() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{
  "name": "app",
  "cdn": {
    "cdn_url": "https://cdn.example.com",
    "storage": { "url": "memory://" },
    "extensions": ["png"],
    "manifest": "cdn-manifest.json"
  }
}"#,
    )
    .unwrap();

    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    assert_eq!(config.extensions, vec!["png"]);
    assert!(!config.is_image("a.jpg"));
    assert_eq!(config.manifest.as_deref(), Some("cdn-manifest.json"));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), DEDICATED).unwrap();

    std::env::set_var("FOB_CDN_PREFIX", "from-env");
    std::env::set_var("FOB_CDN_DRY_RUN", "true");
    std::env::set_var("FOB_CDN_STORAGE__OPTIONS__REGION", "us-east-2");

    let result = CdnConfig::load(dir.path().join(CONFIG_FILE));

    std::env::remove_var("FOB_CDN_PREFIX");
    std::env::remove_var("FOB_CDN_DRY_RUN");
    std::env::remove_var("FOB_CDN_STORAGE__OPTIONS__REGION");

    let config = result.unwrap();
    assert_eq!(config.prefix.as_deref(), Some("from-env"));
    assert!(config.dry_run);
    assert_eq!(config.storage.url, "memory://");
    assert_eq!(config.storage.options.get("region").map(String::as_str), Some("us-east-2"));
}

#[test]
#[serial]
fn test_discover_builds_plugin() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), DEDICATED).unwrap();

    let plugin = FobCdnPlugin::discover(dir.path()).unwrap();
    assert_eq!(plugin.config().cdn_url, "https://cdn.example.com");
    assert!(plugin.registry().is_empty());
}

#[test]
#[serial]
fn test_discover_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "cdn_url = \"https://cdn.example.com\"\n").unwrap();

    let err = FobCdnPlugin::discover(dir.path()).unwrap_err();
    assert!(matches!(err, CdnError::InvalidConfig { .. }));
}
