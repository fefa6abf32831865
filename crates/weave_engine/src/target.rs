//! Targets describe where transformed types and passthrough resources are
//! written: a folder, a jar file, an in-memory map, or nowhere at all.

use crate::error::EngineError;
use crate::manifest::{Manifest, MANIFEST_NAME};
use crate::source::Element;
use crate::types::TypeDescription;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;
use weave_classfile::{binary_name_for_path, CLASS_FILE_EXTENSION};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Where transformed types and retained resources are written. Writing
/// opens a [`Sink`] scoped to one engine run.
pub trait Target {
    /// Opens a sink, propagating the source's manifest if one exists.
    fn write(&self, manifest: Option<&Manifest>) -> Result<Box<dyn Sink>, EngineError>;
}

/// An active writing process. Closed exactly once at the end of a run.
pub trait Sink: Send {
    /// Persists a batch of produced class files.
    fn store(&mut self, types: Vec<(TypeDescription, Vec<u8>)>) -> Result<(), EngineError>;

    /// Copies a passthrough resource through unchanged. Folder markers
    /// (names ending in `/`) are ignored.
    fn retain(&mut self, element: &Element) -> Result<(), EngineError>;

    /// Finalizes the sink.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// A target and sink that discard every entry. Useful for dry runs and for
/// exercising the plugin pipeline in isolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discarding;

impl Target for Discarding {
    fn write(&self, _manifest: Option<&Manifest>) -> Result<Box<dyn Sink>, EngineError> {
        Ok(Box::new(Discarding))
    }
}

impl Sink for Discarding {
    fn store(&mut self, _types: Vec<(TypeDescription, Vec<u8>)>) -> Result<(), EngineError> {
        Ok(())
    }

    fn retain(&mut self, _element: &Element) -> Result<(), EngineError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Materializes types and resources under a folder root.
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

impl Target for ForFolder {
    fn write(&self, manifest: Option<&Manifest>) -> Result<Box<dyn Sink>, EngineError> {
        if let Some(manifest) = manifest {
            let path = resolve_within(&self.folder, MANIFEST_NAME)?;
            write_file(&path, &manifest.to_bytes())?;
        }
        Ok(Box::new(FolderSink {
            folder: self.folder.clone(),
        }))
    }
}

struct FolderSink {
    folder: PathBuf,
}

impl Sink for FolderSink {
    fn store(&mut self, types: Vec<(TypeDescription, Vec<u8>)>) -> Result<(), EngineError> {
        for (type_description, bytes) in types {
            let name = format!(
                "{}{CLASS_FILE_EXTENSION}",
                type_description.internal_name()
            );
            let path = resolve_within(&self.folder, &name)?;
            write_file(&path, &bytes)?;
        }
        Ok(())
    }

    fn retain(&mut self, element: &Element) -> Result<(), EngineError> {
        if element.is_folder_marker() {
            return Ok(());
        }
        let path = resolve_within(&self.folder, element.name())?;
        if element.as_file() == Some(&path) {
            return Ok(());
        }
        write_file(&path, &element.read()?)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    Ok(())
}

/// Resolves a `/`-separated resource name below a root folder, rejecting
/// names that would escape it.
fn resolve_within(root: &Path, name: &str) -> Result<PathBuf, EngineError> {
    let mut path = root.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(segment) => path.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(EngineError::IllegalResourcePath {
                    name: name.to_string(),
                    root: root.to_path_buf(),
                });
            }
        }
    }
    Ok(path)
}

/// Writes a streaming jar. The manifest, when present, is always the first
/// entry; retained elements reuse their original entry attributes.
#[derive(Debug, Clone)]
pub struct ForJarFile {
    path: PathBuf,
}

impl ForJarFile {
    pub fn new(path: impl Into<PathBuf>) -> ForJarFile {
        ForJarFile { path: path.into() }
    }
}

impl Target for ForJarFile {
    fn write(&self, manifest: Option<&Manifest>) -> Result<Box<dyn Sink>, EngineError> {
        let mut writer = ZipWriter::new(File::create(&self.path)?);
        if let Some(manifest) = manifest {
            writer.start_file(MANIFEST_NAME, FileOptions::default())?;
            writer.write_all(&manifest.to_bytes())?;
        }
        debug!(path = %self.path.display(), "opened jar target");
        Ok(Box::new(JarSink {
            writer: Some(writer),
        }))
    }
}

struct JarSink {
    writer: Option<ZipWriter<File>>,
}

impl JarSink {
    fn writer(&mut self) -> Result<&mut ZipWriter<File>, EngineError> {
        self.writer.as_mut().ok_or(EngineError::Poisoned)
    }
}

impl Sink for JarSink {
    fn store(&mut self, types: Vec<(TypeDescription, Vec<u8>)>) -> Result<(), EngineError> {
        for (type_description, bytes) in types {
            let writer = self.writer()?;
            writer.start_file(
                format!(
                    "{}{CLASS_FILE_EXTENSION}",
                    type_description.internal_name()
                ),
                FileOptions::default(),
            )?;
            writer.write_all(&bytes)?;
        }
        Ok(())
    }

    fn retain(&mut self, element: &Element) -> Result<(), EngineError> {
        if element.is_folder_marker() {
            return Ok(());
        }
        let options = match element.attributes() {
            Some(attributes) => FileOptions::default()
                .compression_method(attributes.compression)
                .last_modified_time(attributes.last_modified),
            None => FileOptions::default(),
        };
        let bytes = element.read()?;
        let writer = self.writer()?;
        writer.start_file(element.name(), options)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }
}

/// Accumulates all output into a shared name-to-bytes map that stays
/// readable after the run.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    storage: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemory {
    pub fn new() -> InMemory {
        InMemory::default()
    }

    /// A snapshot of everything stored so far, keyed by resource name.
    pub fn storage(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock().clone()
    }

    /// A snapshot keyed by binary type name, with non-class resources
    /// dropped.
    pub fn to_type_map(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock()
            .iter()
            .filter_map(|(name, bytes)| {
                binary_name_for_path(name).map(|type_name| (type_name, bytes.clone()))
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        match self.storage.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Target for InMemory {
    fn write(&self, manifest: Option<&Manifest>) -> Result<Box<dyn Sink>, EngineError> {
        if let Some(manifest) = manifest {
            self.lock()
                .insert(MANIFEST_NAME.to_string(), manifest.to_bytes());
        }
        Ok(Box::new(InMemory {
            storage: self.storage.clone(),
        }))
    }
}

impl Sink for InMemory {
    fn store(&mut self, types: Vec<(TypeDescription, Vec<u8>)>) -> Result<(), EngineError> {
        let mut storage = self.lock();
        for (type_description, bytes) in types {
            storage.insert(
                format!(
                    "{}{CLASS_FILE_EXTENSION}",
                    type_description.internal_name()
                ),
                bytes,
            );
        }
        Ok(())
    }

    fn retain(&mut self, element: &Element) -> Result<(), EngineError> {
        if element.is_folder_marker() {
            return Ok(());
        }
        let bytes = element.read()?;
        self.lock().insert(element.name().to_string(), bytes);
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
