use crate::types::TypeDescription;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use weave_classfile::ClassReadError;

/// A type-erased error produced by a plugin's `matches`, `apply`,
/// `preprocess` or `close` implementation.
pub type PluginError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All failures recorded for a run, keyed by the failing type.
pub type Failures = BTreeMap<TypeDescription, Vec<PluginError>>;

/// A coarse classification of engine errors that handlers can match on
/// without inspecting individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Unresolved,
    PluginApplication,
    PluginClose,
    LiveInitializer,
    Structural,
}

/// An error raised during a plugin engine application. Policy handlers
/// construct these to abort a run; the engine itself only raises the
/// I/O and structural variants.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to resolve type description for {0}")]
    Unresolved(String),

    #[error("failed to transform {type_name} using {plugin}: {message}")]
    PluginApplication {
        type_name: String,
        plugin: String,
        message: String,
    },

    #[error("failed to transform {type_name}: {count} error(s)")]
    TypeApplication { type_name: String, count: usize },

    #[error("failed to transform at least one type: {0} type(s) failed")]
    BatchApplication(usize),

    #[error("failed to close plugin {plugin}: {message}")]
    PluginClose { plugin: String, message: String },

    #[error("failed to construct plugin {plugin}: {message}")]
    PluginConstruction { plugin: String, message: String },

    #[error("failed to instrument {type_name} due to live initializer for {defining_type}")]
    LiveInitializer {
        type_name: String,
        defining_type: String,
    },

    #[error("discovered a resource when only class files were allowed: {0}")]
    UnexpectedResource(String),

    #[error("required a manifest but no manifest was found")]
    MissingManifest,

    #[error("resource {name} escapes the target root {root}")]
    IllegalResourcePath { name: String, root: PathBuf },

    #[error("no constructor of plugin {0} is resolvable")]
    NoResolvableConstructor(String),

    #[error("ambiguous constructors for plugin {0}")]
    AmbiguousConstructor(String),

    #[error("plugin {0} is not registered for discovery")]
    UnknownPlugin(String),

    #[error("failed to read class file for {type_name}: {source}")]
    ClassFile {
        type_name: String,
        #[source]
        source: ClassReadError,
    },

    #[error("shared transformation state was poisoned by a failed worker")]
    Poisoned,
}

impl EngineError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Io(_) | EngineError::Zip(_) => ErrorKind::Io,
            EngineError::Unresolved(_) => ErrorKind::Unresolved,
            EngineError::PluginApplication { .. }
            | EngineError::TypeApplication { .. }
            | EngineError::BatchApplication(_) => ErrorKind::PluginApplication,
            EngineError::PluginClose { .. } => ErrorKind::PluginClose,
            EngineError::LiveInitializer { .. } => ErrorKind::LiveInitializer,
            EngineError::UnexpectedResource(_)
            | EngineError::MissingManifest
            | EngineError::IllegalResourcePath { .. }
            | EngineError::NoResolvableConstructor(_)
            | EngineError::AmbiguousConstructor(_)
            | EngineError::UnknownPlugin(_)
            | EngineError::PluginConstruction { .. }
            | EngineError::ClassFile { .. }
            | EngineError::Poisoned => ErrorKind::Structural,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_kinds() {
        assert_eq!(
            EngineError::Unresolved("a.B".into()).kind(),
            ErrorKind::Unresolved
        );
        assert_eq!(
            EngineError::BatchApplication(2).kind(),
            ErrorKind::PluginApplication
        );
        assert_eq!(EngineError::MissingManifest.kind(), ErrorKind::Structural);
        assert_eq!(
            EngineError::PluginClose {
                plugin: "p".into(),
                message: "m".into()
            }
            .kind(),
            ErrorKind::PluginClose
        );
    }
}
