//! Typed field access into JSON metadata documents.
//!
//! Validation and remediation both go through [`FieldPath`] and [`Document`],
//! so traversal rules live in one place: a missing or non-container
//! intermediate is simply "absent", never an error.

use crate::error::Error;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

/// A simple (`date`) or dotted (`program.aired.date`) path to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::FieldPath {
                path: raw.to_string(),
                message: "path is empty".to_string(),
            });
        }
        let segments: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::FieldPath {
                path: raw.to_string(),
                message: "path contains an empty segment".to_string(),
            });
        }
        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// One parsed metadata document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path)?;
        Self::from_bytes(path, &bytes)
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self, Error> {
        let root: Value = serde_json::from_slice(bytes).map_err(|e| Error::parse(path, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, field: &FieldPath) -> Option<&Value> {
        field
            .segments()
            .iter()
            .try_fold(&self.root, |value, segment| child(value, segment))
    }

    /// Set `field` to `value`, creating missing intermediate objects.
    pub fn set(&mut self, field: &FieldPath, value: Value) -> Result<(), Error> {
        let (last, parents) = field
            .segments()
            .split_last()
            .ok_or_else(|| Error::FieldPath {
                path: field.to_string(),
                message: "path is empty".to_string(),
            })?;

        let mut current = &mut self.root;
        for segment in parents {
            if current.is_object() && child(current, segment).is_none() {
                if let Value::Object(map) = current {
                    map.insert(segment.clone(), Value::Object(Map::new()));
                }
            }
            current = child_mut(current, segment).ok_or_else(|| Error::FieldPath {
                path: field.to_string(),
                message: format!("'{}' is not an object", segment),
            })?;
        }

        match current {
            Value::Object(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| Error::FieldPath {
                        path: field.to_string(),
                        message: format!("array index '{}' out of bounds", last),
                    })?;
                *slot = value;
                Ok(())
            }
            _ => Err(Error::FieldPath {
                path: field.to_string(),
                message: "parent is not an object".to_string(),
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = serde_json::to_vec_pretty(&self.root)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Replace the file at `path` atomically: temp file in the same
    /// directory, fsync, rename. An existing file keeps its permissions.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let bytes = self.to_bytes()?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut tmp = NamedTempFile::new_in(&parent)?;
        match fs::metadata(path) {
            Ok(existing) => tmp.as_file().set_permissions(existing.permissions())?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Persists a corrected document. Remediation writes through this seam.
pub trait DocumentSink: Send + Sync {
    fn persist(&self, document: &Document, path: &Path) -> Result<(), Error>;
}

/// In-place atomic replacement via [`Document::write`].
pub struct AtomicSink;

impl DocumentSink for AtomicSink {
    fn persist(&self, document: &Document, path: &Path) -> Result<(), Error> {
        document.write(path)
    }
}

/// Normalized string form used to compare a field value against operator input.
/// `null` has no canonical form.
pub fn canonical_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
