//! Class file locators resolve a binary type name to the raw bytes of its
//! class file.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use weave_classfile::{binary_name_for_path, binary_to_internal, CLASS_FILE_EXTENSION};

/// A lookup service mapping a binary type name to its class file bytes.
pub trait ClassFileLocator: Send + Sync {
    /// Resolves the class file for the given binary name, or `None` if the
    /// locator does not know the type.
    fn locate(&self, type_name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// A locator that never resolves a type.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl ClassFileLocator for NoOp {
    fn locate(&self, _type_name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// A locator backed by an in-memory mapping of binary type names to bytes.
#[derive(Debug, Clone, Default)]
pub struct Simple {
    types: Arc<HashMap<String, Arc<[u8]>>>,
}

impl Simple {
    /// Creates a locator for a mapping of binary type names to bytes.
    pub fn of_types(types: impl IntoIterator<Item = (String, Vec<u8>)>) -> Simple {
        Simple {
            types: Arc::new(
                types
                    .into_iter()
                    .map(|(name, bytes)| (name, Arc::from(bytes)))
                    .collect(),
            ),
        }
    }

    /// Creates a locator for a mapping of resource names to bytes, keeping
    /// only entries that denote class files.
    pub fn of_resources<'a>(
        resources: impl IntoIterator<Item = (&'a str, Arc<[u8]>)>,
    ) -> Simple {
        Simple {
            types: Arc::new(
                resources
                    .into_iter()
                    .filter_map(|(name, bytes)| {
                        binary_name_for_path(name).map(|type_name| (type_name, bytes))
                    })
                    .collect(),
            ),
        }
    }
}

impl ClassFileLocator for Simple {
    fn locate(&self, type_name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.types.get(type_name).map(|bytes| bytes.to_vec()))
    }
}

/// A locator that reads class files from a folder hierarchy.
#[derive(Debug, Clone)]
pub struct ForFolder {
    folder: PathBuf,
}

impl ForFolder {
    pub fn new(folder: impl Into<PathBuf>) -> ForFolder {
        ForFolder {
            folder: folder.into(),
        }
    }
}

impl ClassFileLocator for ForFolder {
    fn locate(&self, type_name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut path = self.folder.clone();
        for segment in binary_to_internal(type_name).split('/') {
            path.push(segment);
        }
        path.set_file_name(match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => format!("{name}{CLASS_FILE_EXTENSION}"),
            None => return Ok(None),
        });
        if path.is_file() {
            std::fs::read(&path).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// A locator that queries its delegates in order and returns the first
/// successful resolution.
#[derive(Clone, Default)]
pub struct Compound {
    delegates: Vec<Arc<dyn ClassFileLocator>>,
}

impl Compound {
    pub fn new(delegates: Vec<Arc<dyn ClassFileLocator>>) -> Compound {
        Compound { delegates }
    }
}

impl ClassFileLocator for Compound {
    fn locate(&self, type_name: &str) -> io::Result<Option<Vec<u8>>> {
        for delegate in &self.delegates {
            if let Some(bytes) = delegate.locate(type_name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}
