//! Sources describe where candidate types and resources come from: a
//! folder, a jar file, an in-memory map, or a composition of other
//! sources.

use crate::locator::{self, ClassFileLocator};
use crate::manifest::{Manifest, MANIFEST_NAME};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use weave_classfile::{binary_to_internal, CLASS_FILE_EXTENSION};
use zip::{CompressionMethod, DateTime, ZipArchive};

/// Original jar entry metadata that is reused when an element is copied
/// into another jar.
#[derive(Debug, Clone, Copy)]
pub struct EntryAttributes {
    pub compression: CompressionMethod,
    pub last_modified: DateTime,
}

#[derive(Debug, Clone)]
enum Payload {
    Bytes(Arc<[u8]>),
    File { path: PathBuf },
}

/// A named binary artifact yielded by an origin: either a class file
/// candidate or an opaque resource. Elements are immutable; consumers read
/// their content but never mutate the underlying source.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    payload: Payload,
    attributes: Option<EntryAttributes>,
}

impl Element {
    /// Creates an element over owned bytes.
    pub fn of_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Element {
        Element {
            name: name.into(),
            payload: Payload::Bytes(Arc::from(bytes)),
            attributes: None,
        }
    }

    fn of_file(name: String, path: PathBuf) -> Element {
        Element {
            name,
            payload: Payload::File { path },
            attributes: None,
        }
    }

    fn with_attributes(mut self, attributes: EntryAttributes) -> Element {
        self.attributes = Some(attributes);
        self
    }

    /// The element's relative path and name, `/`-separated.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the element's binary content.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match &self.payload {
            Payload::Bytes(bytes) => Ok(bytes.to_vec()),
            Payload::File { path } => fs::read(path),
        }
    }

    /// The file backing this element, if it is file-backed.
    pub fn as_file(&self) -> Option<&Path> {
        match &self.payload {
            Payload::Bytes(_) => None,
            Payload::File { path } => Some(path),
        }
    }

    /// Original jar entry metadata, if the element stems from a jar.
    pub fn attributes(&self) -> Option<&EntryAttributes> {
        self.attributes.as_ref()
    }

    /// Whether the element only marks a folder.
    pub fn is_folder_marker(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// A lazy sequence of elements. Each call to [`Origin::elements`] starts a
/// fresh iteration; a single iterator cannot be restarted.
pub type ElementIterator<'a> = Box<dyn Iterator<Item = io::Result<Element>> + 'a>;

/// Where candidate types and resources come from. Reading a source yields
/// an [`Origin`] bound to one pass over the source's content.
pub trait Source {
    fn read(&self) -> io::Result<Box<dyn Origin>>;
}

/// A resource handle bound to one read of a source.
pub trait Origin {
    /// The source's manifest, if one exists.
    fn manifest(&self) -> io::Result<Option<Manifest>>;

    /// A locator that resolves class files from this origin's own
    /// elements. The engine composes it with any configured parent
    /// locator, querying the origin first.
    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator>;

    /// Starts a fresh iteration over the origin's elements.
    fn elements(&self) -> ElementIterator<'_>;

    /// Releases all underlying handles exactly once. Dropping an origin
    /// without closing it also releases the handles, but discards errors.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A zero-element, manifest-less source and origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Source for Empty {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        Ok(Box::new(Empty))
    }
}

impl Origin for Empty {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        Ok(None)
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        Arc::new(locator::NoOp)
    }

    fn elements(&self) -> ElementIterator<'_> {
        Box::new(std::iter::empty())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// The contents of a folder. Class files resolve to their `/`-separated
/// relative paths; iteration is a deterministic directory-then-file
/// traversal with entries sorted by name.
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

impl Source for ForFolder {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        Ok(Box::new(FolderOrigin {
            folder: self.folder.clone(),
        }))
    }
}

struct FolderOrigin {
    folder: PathBuf,
}

impl Origin for FolderOrigin {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        let path = manifest_path(&self.folder);
        if path.is_file() {
            let manifest = Manifest::parse(&fs::read(&path)?)
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
            Ok(Some(manifest))
        } else {
            Ok(None)
        }
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        Arc::new(locator::ForFolder::new(self.folder.clone()))
    }

    fn elements(&self) -> ElementIterator<'_> {
        Box::new(FolderIterator {
            root: self.folder.clone(),
            manifest: manifest_path(&self.folder),
            pending: vec![self.folder.clone()],
        })
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

fn manifest_path(folder: &Path) -> PathBuf {
    let mut path = folder.to_path_buf();
    for segment in MANIFEST_NAME.split('/') {
        path.push(segment);
    }
    path
}

struct FolderIterator {
    root: PathBuf,
    manifest: PathBuf,
    pending: Vec<PathBuf>,
}

impl Iterator for FolderIterator {
    type Item = io::Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(path) = self.pending.pop() {
            if path.is_dir() {
                let entries = match fs::read_dir(&path) {
                    Ok(entries) => entries,
                    Err(error) => return Some(Err(error)),
                };
                let mut children = Vec::new();
                for entry in entries {
                    match entry {
                        Ok(entry) => children.push(entry.path()),
                        Err(error) => return Some(Err(error)),
                    }
                }
                children.sort();
                children.reverse();
                self.pending.extend(children);
                continue;
            }
            if path == self.manifest {
                continue;
            }
            let name = match relative_name(&self.root, &path) {
                Some(name) => name,
                None => continue,
            };
            return Some(Ok(Element::of_file(name, path)));
        }
        None
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// A jar file. All entries are loaded when the source is read, so the
/// origin can serve concurrent class file lookups without seeking in the
/// archive.
#[derive(Debug, Clone)]
pub struct ForJarFile {
    path: PathBuf,
}

impl ForJarFile {
    pub fn new(path: impl Into<PathBuf>) -> ForJarFile {
        ForJarFile { path: path.into() }
    }
}

impl Source for ForJarFile {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        let file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(io::Error::from)?;
        let mut elements = Vec::with_capacity(archive.len());
        let mut manifest = None;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(io::Error::from)?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                elements.push(Element::of_bytes(name, Vec::new()));
                continue;
            }
            let attributes = EntryAttributes {
                compression: entry.compression(),
                last_modified: entry.last_modified(),
            };
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            if name == MANIFEST_NAME {
                manifest = Some(
                    Manifest::parse(&bytes)
                        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?,
                );
            }
            elements.push(Element::of_bytes(name, bytes).with_attributes(attributes));
        }
        debug!(path = %self.path.display(), entries = elements.len(), "read jar source");
        Ok(Box::new(JarOrigin { elements, manifest }))
    }
}

struct JarOrigin {
    elements: Vec<Element>,
    manifest: Option<Manifest>,
}

impl Origin for JarOrigin {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        Ok(self.manifest.clone())
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        Arc::new(locator::Simple::of_resources(self.elements.iter().filter_map(
            |element| match &element.payload {
                Payload::Bytes(bytes) => Some((element.name(), bytes.clone())),
                Payload::File { .. } => None,
            },
        )))
    }

    fn elements(&self) -> ElementIterator<'_> {
        Box::new(self.elements.iter().cloned().map(Ok))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// A source over an in-memory mapping of resource names to bytes. The
/// exposed element sequence is a read-only view in map iteration order.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    storage: BTreeMap<String, Arc<[u8]>>,
}

impl InMemory {
    pub fn new(storage: BTreeMap<String, Vec<u8>>) -> InMemory {
        InMemory {
            storage: storage
                .into_iter()
                .map(|(name, bytes)| (name, Arc::from(bytes)))
                .collect(),
        }
    }

    /// Represents a mapping of binary type names to class file bytes as a
    /// source.
    pub fn of_types(types: impl IntoIterator<Item = (String, Vec<u8>)>) -> InMemory {
        InMemory {
            storage: types
                .into_iter()
                .map(|(name, bytes)| {
                    (
                        format!("{}{CLASS_FILE_EXTENSION}", binary_to_internal(&name)),
                        Arc::from(bytes),
                    )
                })
                .collect(),
        }
    }
}

impl Source for InMemory {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        Ok(Box::new(InMemory {
            storage: self.storage.clone(),
        }))
    }
}

impl Origin for InMemory {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        match self.storage.get(MANIFEST_NAME) {
            Some(bytes) => Manifest::parse(bytes)
                .map(Some)
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error)),
            None => Ok(None),
        }
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        Arc::new(locator::Simple::of_resources(
            self.storage
                .iter()
                .map(|(name, bytes)| (name.as_str(), bytes.clone())),
        ))
    }

    fn elements(&self) -> ElementIterator<'_> {
        Box::new(self.storage.iter().map(|(name, bytes)| {
            Ok(Element {
                name: name.clone(),
                payload: Payload::Bytes(bytes.clone()),
                attributes: None,
            })
        }))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// Concatenates several sources. Class file resolution queries the
/// children in order and the first successful resolution wins; the first
/// manifest found wins, but every child is still queried and closed.
pub struct Compound {
    sources: Vec<Box<dyn Source>>,
}

impl Compound {
    pub fn new(sources: Vec<Box<dyn Source>>) -> Compound {
        Compound { sources }
    }
}

impl Source for Compound {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        if self.sources.is_empty() {
            return Ok(Box::new(Empty));
        }
        let mut origins = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            origins.push(source.read()?);
        }
        Ok(Box::new(CompoundOrigin { origins }))
    }
}

struct CompoundOrigin {
    origins: Vec<Box<dyn Origin>>,
}

impl Origin for CompoundOrigin {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        let mut manifest = None;
        for origin in &self.origins {
            let candidate = origin.manifest()?;
            if manifest.is_none() {
                manifest = candidate;
            }
        }
        Ok(manifest)
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        Arc::new(locator::Compound::new(
            self.origins
                .iter()
                .map(|origin| origin.class_file_locator())
                .collect(),
        ))
    }

    fn elements(&self) -> ElementIterator<'_> {
        Box::new(self.origins.iter().flat_map(|origin| origin.elements()))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut first_error = None;
        for origin in self.origins {
            if let Err(error) = origin.close() {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

/// A predicate over elements.
pub type ElementMatcher = dyn Fn(&Element) -> bool + Send + Sync;

/// A source that only yields elements matching a predicate. Manifest
/// resolution can be suppressed independently of the element filter.
pub struct Filtering {
    delegate: Box<dyn Source>,
    matcher: Arc<ElementMatcher>,
    manifest: bool,
}

impl Filtering {
    /// Creates a filtering source that retains the delegate's manifest.
    pub fn new(
        delegate: Box<dyn Source>,
        matcher: impl Fn(&Element) -> bool + Send + Sync + 'static,
    ) -> Filtering {
        Filtering {
            delegate,
            matcher: Arc::new(matcher),
            manifest: true,
        }
    }

    /// Configures whether the delegate's manifest is resolved at all.
    pub fn with_manifest(mut self, manifest: bool) -> Filtering {
        self.manifest = manifest;
        self
    }
}

impl Source for Filtering {
    fn read(&self) -> io::Result<Box<dyn Origin>> {
        Ok(Box::new(FilteringOrigin {
            delegate: self.delegate.read()?,
            matcher: self.matcher.clone(),
            manifest: self.manifest,
        }))
    }
}

struct FilteringOrigin {
    delegate: Box<dyn Origin>,
    matcher: Arc<ElementMatcher>,
    manifest: bool,
}

impl Origin for FilteringOrigin {
    fn manifest(&self) -> io::Result<Option<Manifest>> {
        if self.manifest {
            self.delegate.manifest()
        } else {
            Ok(None)
        }
    }

    fn class_file_locator(&self) -> Arc<dyn ClassFileLocator> {
        self.delegate.class_file_locator()
    }

    fn elements(&self) -> ElementIterator<'_> {
        let matcher = self.matcher.clone();
        Box::new(self.delegate.elements().filter(move |element| {
            match element {
                Ok(element) => (*matcher)(element),
                Err(_) => true,
            }
        }))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        self.delegate.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(origin: &dyn Origin) -> Vec<Element> {
        origin
            .elements()
            .collect::<io::Result<Vec<_>>>()
            .expect("elements")
    }

    #[test]
    fn empty_source_yields_nothing() {
        let origin = Empty.read().expect("read");
        assert!(origin.manifest().expect("manifest").is_none());
        assert!(collect(&*origin).is_empty());
        origin.close().expect("close");
    }

    #[test]
    fn in_memory_source_iterates_in_map_order() {
        let source = InMemory::new(BTreeMap::from([
            ("b.txt".to_string(), vec![2]),
            ("a/C.class".to_string(), vec![1]),
        ]));
        let origin = source.read().expect("read");
        let names: Vec<String> = collect(&*origin)
            .iter()
            .map(|element| element.name().to_string())
            .collect();
        assert_eq!(names, ["a/C.class", "b.txt"]);
        origin.close().expect("close");
    }

    #[test]
    fn in_memory_manifest_is_parsed_from_the_conventional_entry() {
        let source = InMemory::new(BTreeMap::from([(
            MANIFEST_NAME.to_string(),
            b"Manifest-Version: 1.0\r\n\r\n".to_vec(),
        )]));
        let origin = source.read().expect("read");
        assert!(origin.manifest().expect("manifest").is_some());
    }

    #[test]
    fn filtering_source_applies_the_predicate() {
        let source = InMemory::new(BTreeMap::from([
            ("keep.txt".to_string(), vec![1]),
            ("drop.txt".to_string(), vec![2]),
        ]));
        let filtering = Filtering::new(Box::new(source), |element: &Element| {
            element.name().starts_with("keep")
        });
        let origin = filtering.read().expect("read");
        let names: Vec<String> = collect(&*origin)
            .iter()
            .map(|element| element.name().to_string())
            .collect();
        assert_eq!(names, ["keep.txt"]);
    }

    #[test]
    fn filtering_source_can_suppress_the_manifest() {
        let source = InMemory::new(BTreeMap::from([(
            MANIFEST_NAME.to_string(),
            b"Manifest-Version: 1.0\r\n\r\n".to_vec(),
        )]));
        let filtering = Filtering::new(Box::new(source), |_: &Element| true).with_manifest(false);
        let origin = filtering.read().expect("read");
        assert!(origin.manifest().expect("manifest").is_none());
    }

    #[test]
    fn empty_compound_collapses_to_the_empty_origin() {
        let origin = Compound::new(Vec::new()).read().expect("read");
        assert!(collect(&*origin).is_empty());
    }

    #[test]
    fn compound_concatenates_and_resolves_in_order() {
        let first = InMemory::of_types([("a.A".to_string(), vec![1])]);
        let second = InMemory::of_types([("a.B".to_string(), vec![2])]);
        let compound = Compound::new(vec![Box::new(first), Box::new(second)]);
        let origin = compound.read().expect("read");
        let names: Vec<String> = collect(&*origin)
            .iter()
            .map(|element| element.name().to_string())
            .collect();
        assert_eq!(names, ["a/A.class", "a/B.class"]);
        let locator = origin.class_file_locator();
        assert_eq!(locator.locate("a.B").expect("locate"), Some(vec![2]));
        origin.close().expect("close");
    }
}
