//! Error types for the CDN plugin

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdnError>;

/// Errors that can occur while configuring the plugin or publishing images
#[derive(Error, Debug, Diagnostic)]
pub enum CdnError {
    /// No configuration file was found during discovery
    #[error("CDN config not found. Searched in: {searched_paths:?}")]
    #[diagnostic(
        code(fob::cdn::config_not_found),
        help("Create fob-cdn.toml or add a [cdn] table to fob.toml")
    )]
    ConfigNotFound { searched_paths: Vec<PathBuf> },

    /// A configuration value could not be parsed or is invalid
    #[error("Invalid CDN config value for '{field}': {message}")]
    #[diagnostic(code(fob::cdn::invalid_config))]
    InvalidConfig {
        field: String,
        #[help]
        message: String,
    },

    /// Layered configuration could not be extracted
    #[error("Failed to load CDN config: {source}")]
    #[diagnostic(
        code(fob::cdn::config_load),
        help("Check fob-cdn.toml and FOB_CDN_* environment variables")
    )]
    ConfigLoad {
        #[source]
        source: Box<figment::Error>,
    },

    /// The object store could not be created from the storage URL
    #[error("Failed to open object store '{url}': {source}")]
    #[diagnostic(
        code(fob::cdn::store_unavailable),
        help("Supported schemes: s3://, gs://, az://, file://, memory://")
    )]
    StoreUnavailable {
        url: String,
        #[source]
        source: object_store::Error,
    },

    /// Uploading an object failed
    #[error("Failed to upload '{key}': {source}")]
    #[diagnostic(
        code(fob::cdn::upload_failed),
        help("Check bucket permissions and credentials in storage.options")
    )]
    UploadFailed {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// Checking whether an object exists failed
    #[error("Failed to check '{key}': {source}")]
    #[diagnostic(code(fob::cdn::head_failed))]
    HeadFailed {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// Manifest serialization failed
    #[error("Failed to serialize CDN manifest: {source}")]
    #[diagnostic(code(fob::cdn::manifest))]
    Manifest {
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(fob::cdn::io))]
    Io(#[from] std::io::Error),
}

impl CdnError {
    pub fn config_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigNotFound { searched_paths }
    }

    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn config_load(source: figment::Error) -> Self {
        Self::ConfigLoad {
            source: Box::new(source),
        }
    }

    pub fn store_unavailable(url: impl Into<String>, source: object_store::Error) -> Self {
        Self::StoreUnavailable {
            url: url.into(),
            source,
        }
    }

    pub fn upload_failed(key: impl Into<String>, source: object_store::Error) -> Self {
        Self::UploadFailed {
            key: key.into(),
            source,
        }
    }

    pub fn head_failed(key: impl Into<String>, source: object_store::Error) -> Self {
        Self::HeadFailed {
            key: key.into(),
            source,
        }
    }

    pub fn manifest(source: serde_json::Error) -> Self {
        Self::Manifest { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_message_names_field() {
        let err = CdnError::invalid_config("cdn_url", "must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid CDN config value for 'cdn_url': must not be empty"
        );
    }

    #[test]
    fn diagnostic_codes_are_namespaced() {
        let err = CdnError::config_not_found(vec![PathBuf::from("fob-cdn.toml")]);
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("fob::cdn::config_not_found"));
    }
}
