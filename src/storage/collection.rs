//! The on-disk form of an identity map.
//!
//! Each indexed type is stored in one file holding every document of its
//! identity map. Links to documents of another indexed type are written as
//! [`ExternalRef`] tokens instead of being inlined, so no document is stored
//! in more than one collection and cycles between collections terminate.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::{Format, Key, Value};

/// An identity map serialized to its backing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CollectionVersion", into = "CollectionVersion")]
pub struct StoredCollection {
    /// Module path of the collection's type.
    pub module: String,
    /// Name of the collection's type.
    pub type_name: String,
    /// Identity map entries, in insertion order.
    pub entries: Vec<StoredEntry>,
}

/// One entry of a stored identity map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The identity value the document is indexed under.
    pub key: Key,
    /// The document itself, or a token for a subtype stored elsewhere.
    pub document: StoredRef,
}

/// A token standing in for a document held by another collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRef {
    /// Module path of the target type.
    pub module: String,
    /// Name of the target type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Identity value of the target document.
    pub key: Key,
}

/// How a reference to a document is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum StoredRef {
    /// The document is written in full, labelled so later references in the
    /// same file can point back at it.
    Inline {
        /// File-local label.
        anchor: u64,
        /// The document.
        document: StoredDocument,
    },
    /// A document already written inline earlier in the same file.
    Alias {
        /// Label of the inline document.
        anchor: u64,
    },
    /// A document of the collection's own type, by identity value.
    Member {
        /// Identity value within this collection.
        key: Key,
    },
    /// A document held by another collection.
    External(ExternalRef),
}

/// A document's fields as written to disk.
///
/// Referrers are never stored; they are rebuilt when references are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// The document's runtime type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Field contents, by field name.
    pub fields: BTreeMap<String, StoredField>,
    /// Indexed documents that reach this one through their references. They
    /// are loaded along with this document so their links are restored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<ExternalRef>,
}

/// The contents of one field as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum StoredField {
    /// A plain value.
    Value {
        /// The value.
        value: Value,
    },
    /// A reference set.
    References {
        /// The established element type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element_type: Option<String>,
        /// The elements, in insertion order.
        items: Vec<StoredRef>,
    },
}

impl StoredCollection {
    /// An empty collection of the given type.
    #[must_use]
    pub fn new(module: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            type_name: type_name.into(),
            entries: Vec::new(),
        }
    }

    /// Reads a collection file.
    ///
    /// Returns `Ok(None)` if the file does not exist; a missing collection is
    /// an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load(path: &Path, format: Format) -> Result<Option<Self>, StorageError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::read(BufReader::new(file), format, path).map(Some)
    }

    pub(crate) fn read<R: Read>(
        reader: R,
        format: Format,
        path: &Path,
    ) -> Result<Self, StorageError> {
        match format {
            Format::Yaml => serde_yaml::from_reader(reader).map_err(|source| StorageError::Yaml {
                path: path.to_path_buf(),
                source,
            }),
            Format::Json => serde_json::from_reader(reader).map_err(|source| StorageError::Json {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the whole collection to a file, replacing any previous content.
    ///
    /// Parent directories are created automatically if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save(&self, path: &Path, format: Format) -> Result<(), StorageError> {
        let io_error = |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        match format {
            Format::Yaml => {
                serde_yaml::to_writer(&mut writer, self).map_err(|source| StorageError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            Format::Json => {
                serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
                    StorageError::Json {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            }
        }
        writer.flush().map_err(io_error)
    }
}

/// Errors that can occur when reading or writing a collection file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The file could not be read, written or removed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// The collection file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The YAML content could not be encoded or decoded.
    #[error("malformed YAML collection {}: {source}", path.display())]
    Yaml {
        /// The collection file.
        path: PathBuf,
        /// The underlying error.
        source: serde_yaml::Error,
    },
    /// The JSON content could not be encoded or decoded.
    #[error("malformed JSON collection {}: {source}", path.display())]
    Json {
        /// The collection file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The file holds a collection of a different type.
    #[error("{} holds a {found} collection, expected {expected}", path.display())]
    TypeMismatch {
        /// The collection file.
        path: PathBuf,
        /// The type the file was read for.
        expected: String,
        /// The type recorded in the file.
        found: String,
    },
    /// The content decodes but violates the collection's structure.
    #[error("corrupt collection {}: {reason}", path.display())]
    Corrupt {
        /// The collection file.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },
}

/// The serialized versions of a collection.
/// This allows for future changes to the collection format without breaking
/// compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum CollectionVersion {
    #[serde(rename = "1")]
    V1 {
        module: String,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        entries: Vec<StoredEntry>,
    },
}

impl From<CollectionVersion> for StoredCollection {
    fn from(version: CollectionVersion) -> Self {
        match version {
            CollectionVersion::V1 {
                module,
                type_name,
                entries,
            } => Self {
                module,
                type_name,
                entries,
            },
        }
    }
}

impl From<StoredCollection> for CollectionVersion {
    fn from(collection: StoredCollection) -> Self {
        Self::V1 {
            module: collection.module,
            type_name: collection.type_name,
            entries: collection.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    fn sample() -> StoredCollection {
        let refugee = StoredDocument {
            type_name: "Refugee".to_string(),
            fields: BTreeMap::from([(
                "first_name".to_string(),
                StoredField::Value {
                    value: Value::from("Ada"),
                },
            )]),
            roots: vec![ExternalRef {
                module: "relief::camp".to_string(),
                type_name: "Camp".to_string(),
                key: Key::from("camp1"),
            }],
        };
        let camp = StoredDocument {
            type_name: "Camp".to_string(),
            fields: BTreeMap::from([
                (
                    "name".to_string(),
                    StoredField::Value {
                        value: Value::from("camp1"),
                    },
                ),
                (
                    "refugees".to_string(),
                    StoredField::References {
                        element_type: Some("Refugee".to_string()),
                        items: vec![
                            StoredRef::Inline {
                                anchor: 1,
                                document: refugee,
                            },
                            StoredRef::Alias { anchor: 1 },
                        ],
                    },
                ),
                (
                    "volunteers".to_string(),
                    StoredField::References {
                        element_type: None,
                        items: vec![StoredRef::External(ExternalRef {
                            module: "relief::user".to_string(),
                            type_name: "Volunteer".to_string(),
                            key: Key::from("vvv1"),
                        })],
                    },
                ),
            ]),
            roots: Vec::new(),
        };

        StoredCollection {
            module: "relief::camp".to_string(),
            type_name: "Camp".to_string(),
            entries: vec![StoredEntry {
                key: Key::from("camp1"),
                document: StoredRef::Inline {
                    anchor: 0,
                    document: camp,
                },
            }],
        }
    }

    #[test_case(Format::Yaml; "yaml")]
    #[test_case(Format::Json; "json")]
    fn saved_collection_loads_back(format: Format) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(format!("Camp.{}", format.extension()));

        sample().save(&path, format).unwrap();
        let loaded = StoredCollection::load(&path, format).unwrap();

        assert_eq!(loaded, Some(sample()));
    }

    #[test]
    fn missing_file_is_an_empty_collection() {
        let tmp = TempDir::new().unwrap();
        let loaded = StoredCollection::load(&tmp.path().join("Camp.yaml"), Format::Yaml).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Camp.json");
        std::fs::write(&path, "{ not json").unwrap();

        let error = StoredCollection::load(&path, Format::Json).unwrap_err();
        assert!(matches!(error, StorageError::Json { .. }));
    }

    #[test]
    fn external_tokens_are_tagged() {
        let token = StoredRef::External(ExternalRef {
            module: "relief::plan".to_string(),
            type_name: "Plan".to_string(),
            key: Key::from("plan1"),
        });

        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ref": "external",
                "module": "relief::plan",
                "type": "Plan",
                "key": "plan1",
            })
        );
    }

    #[test]
    fn version_tag_is_written() {
        let yaml = serde_yaml::to_string(&StoredCollection::new("m", "Camp")).unwrap();
        assert!(yaml.starts_with("_version: '1'"));
    }
}
