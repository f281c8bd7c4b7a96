//! Path utilities for collection files
//!
//! Every indexed type is persisted to exactly one file in the data directory,
//! named after the type:
//!
//! - `data/Camp.yaml` holds the `Camp` identity map
//! - `data/Plan.json` holds the `Plan` identity map when the store is
//!   configured for JSON

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::domain::{schema::is_valid_type_name, Format};

/// Construct the path of the collection file of a type.
#[must_use]
pub fn collection_path(data_dir: &Path, type_name: &str, format: Format) -> PathBuf {
    data_dir.join(type_name).with_extension(format.extension())
}

/// Parse the type name and format from a collection file path.
///
/// # Errors
///
/// Returns an error if:
/// - The path has no valid UTF-8 file stem
/// - The extension is not a known collection format
/// - The stem is not a valid type name
pub fn parse_collection_path(path: &Path) -> Result<(String, Format), ParseError> {
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .ok_or(ParseError::InvalidPath)?;
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    let format = Format::from_extension(extension)
        .ok_or_else(|| ParseError::UnknownExtension(extension.to_string()))?;
    if !is_valid_type_name(stem) {
        return Err(ParseError::InvalidTypeName(stem.to_string()));
    }
    Ok((stem.to_string(), format))
}

/// Collect the collection files in a data directory, sorted by type name.
///
/// Files that do not look like collections are skipped.
#[must_use]
pub fn collection_files(data_dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files: Vec<_> = WalkDir::new(data_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| match parse_collection_path(entry.path()) {
            Ok((type_name, _)) => Some((type_name, entry.into_path())),
            Err(e) => {
                tracing::debug!("Skipping {}: {e}", entry.path().display());
                None
            }
        })
        .collect();
    files.sort();
    files
}

/// Errors that can occur when parsing a collection path.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// The path has no usable file name.
    #[error("invalid collection path")]
    InvalidPath,
    /// The extension is not a collection format.
    #[error("unknown collection extension '{0}'")]
    UnknownExtension(String),
    /// The file stem is not a type name.
    #[error("'{0}' is not a valid type name")]
    InvalidTypeName(String),
}
