//! Typed parsing of configuration and data documents.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::result::Result;

/// Parse a TOML document into `T`.
///
/// # Errors
///
/// Returns `TomlParseFailed` if the document is malformed or does not match `T`.
pub fn from_toml_str<T: DeserializeOwned>(input: &str) -> Result<T> {
    toml::from_str(input).map_err(|e| Error::toml_parse_failed(e.to_string()))
}

/// Parse a JSON document into `T`.
///
/// # Errors
///
/// Returns `JsonParseFailed` if the document is malformed or does not match `T`.
pub fn from_json_str<T: DeserializeOwned>(input: &str) -> Result<T> {
    serde_json::from_str(input).map_err(|e| Error::json_parse_failed(e.to_string()))
}

/// Read a file and parse it as TOML.
///
/// # Errors
///
/// Returns `FileReadFailed` when the file cannot be read, or `TomlParseFailed`.
pub fn read_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    from_toml_str(&contents)
}
