//! Observers and failure policies for a plugin engine application.
//!
//! Both traits use `Err` to abort the run: the engine never decides
//! fatality itself, it raises events and propagates whatever the handlers
//! return. Default method implementations do nothing, so implementers
//! override only the events they care about.

use crate::error::{EngineError, Failures, PluginError};
use crate::manifest::Manifest;
use crate::types::TypeDescription;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// A failure policy consulted on every significant error-like event.
pub trait ErrorHandler: Send + Sync {
    /// A plugin failed while matching or transforming a type.
    fn on_error(
        &self,
        _type_description: &TypeDescription,
        _plugin: &str,
        _error: &PluginError,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// All plugins were applied to a type and at least one failed.
    fn on_type_error(
        &self,
        _type_description: &TypeDescription,
        _errors: &[PluginError],
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// The whole batch completed and at least one type failed.
    fn on_batch_error(&self, _failed: &Failures) -> Result<(), EngineError> {
        Ok(())
    }

    /// A plugin could not be closed.
    fn on_plugin_error(&self, _plugin: &str, _error: &PluginError) -> Result<(), EngineError> {
        Ok(())
    }

    /// A transformation implied a live initializer.
    fn on_live_initializer(
        &self,
        _type_description: &TypeDescription,
        _defining_type: &TypeDescription,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// A type name could not be resolved.
    fn on_unresolved(&self, _type_name: &str) -> Result<(), EngineError> {
        Ok(())
    }

    /// A manifest was found, or found missing.
    fn on_manifest(&self, _manifest: Option<&Manifest>) -> Result<(), EngineError> {
        Ok(())
    }

    /// A non-class resource was discovered.
    fn on_resource(&self, _name: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

/// An observer notified of every event during an engine application.
pub trait Listener: ErrorHandler {
    /// A type was discovered, prior to resolution.
    fn on_discovery(&self, _type_name: &str) -> Result<(), EngineError> {
        Ok(())
    }

    /// A single plugin transformed a type.
    fn on_transformation(
        &self,
        _type_description: &TypeDescription,
        _plugin: &str,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// A type was transformed by at least one plugin.
    fn on_transformed(
        &self,
        _type_description: &TypeDescription,
        _plugins: &[String],
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// A single plugin did not match a type.
    fn on_ignored(
        &self,
        _type_description: &TypeDescription,
        _plugin: &str,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// No plugin matched a type, or the engine's ignore matcher excluded
    /// it.
    fn on_unmatched(&self, _type_description: &TypeDescription) -> Result<(), EngineError> {
        Ok(())
    }

    /// Handling of a type finished, whether transformed or not.
    fn on_complete(&self, _type_description: &TypeDescription) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A listener without any behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl ErrorHandler for NoOp {}

impl Listener for NoOp {}

/// Failure policies that abort a run at different points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failing {
    /// The first error for any type aborts the run immediately.
    FailFast,
    /// Errors accumulate per type; the run aborts once all plugins for a
    /// failing type were applied.
    FailAfterType,
    /// All types are processed; the run fails afterwards if any type
    /// failed.
    FailLast,
}

impl ErrorHandler for Failing {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        match self {
            Failing::FailFast => Err(EngineError::PluginApplication {
                type_name: type_description.name().to_string(),
                plugin: plugin.to_string(),
                message: error.to_string(),
            }),
            Failing::FailAfterType | Failing::FailLast => Ok(()),
        }
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        match self {
            Failing::FailAfterType => Err(EngineError::TypeApplication {
                type_name: type_description.name().to_string(),
                count: errors.len(),
            }),
            Failing::FailFast | Failing::FailLast => Ok(()),
        }
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        match self {
            Failing::FailLast => Err(EngineError::BatchApplication(failed.len())),
            Failing::FailFast | Failing::FailAfterType => Ok(()),
        }
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        Err(EngineError::PluginClose {
            plugin: plugin.to_string(),
            message: error.to_string(),
        })
    }
}

/// Always-active checks that are orthogonal to the failing policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcing {
    /// Unresolved type names are fatal.
    AllTypesResolved,
    /// Any live initializer is fatal.
    NoLiveInitializers,
    /// Any non-class resource is fatal.
    ClassFilesOnly,
    /// A missing manifest is fatal.
    ManifestRequired,
}

impl ErrorHandler for Enforcing {
    fn on_unresolved(&self, type_name: &str) -> Result<(), EngineError> {
        match self {
            Enforcing::AllTypesResolved => Err(EngineError::Unresolved(type_name.to_string())),
            _ => Ok(()),
        }
    }

    fn on_live_initializer(
        &self,
        type_description: &TypeDescription,
        defining_type: &TypeDescription,
    ) -> Result<(), EngineError> {
        match self {
            Enforcing::NoLiveInitializers => Err(EngineError::LiveInitializer {
                type_name: type_description.name().to_string(),
                defining_type: defining_type.name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn on_resource(&self, name: &str) -> Result<(), EngineError> {
        match self {
            Enforcing::ClassFilesOnly => Err(EngineError::UnexpectedResource(name.to_string())),
            _ => Ok(()),
        }
    }

    fn on_manifest(&self, manifest: Option<&Manifest>) -> Result<(), EngineError> {
        match self {
            Enforcing::ManifestRequired if manifest.is_none() => {
                Err(EngineError::MissingManifest)
            }
            _ => Ok(()),
        }
    }
}

fn keep_first(first: &mut Option<EngineError>, result: Result<(), EngineError>) {
    if let Err(error) = result {
        if first.is_none() {
            *first = Some(error);
        }
    }
}

fn fold(first: Option<EngineError>) -> Result<(), EngineError> {
    match first {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

/// Forwards every event to all delegates in order. Delegates always all
/// see the event; the first returned error is raised after the fan-out.
#[derive(Default)]
pub struct CompoundErrorHandler {
    delegates: Vec<Arc<dyn ErrorHandler>>,
}

impl CompoundErrorHandler {
    pub fn new(delegates: Vec<Arc<dyn ErrorHandler>>) -> CompoundErrorHandler {
        CompoundErrorHandler { delegates }
    }
}

impl ErrorHandler for CompoundErrorHandler {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_error(type_description, plugin, error));
        }
        fold(first)
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_type_error(type_description, errors));
        }
        fold(first)
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_batch_error(failed));
        }
        fold(first)
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_plugin_error(plugin, error));
        }
        fold(first)
    }

    fn on_live_initializer(
        &self,
        type_description: &TypeDescription,
        defining_type: &TypeDescription,
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(
                &mut first,
                delegate.on_live_initializer(type_description, defining_type),
            );
        }
        fold(first)
    }

    fn on_unresolved(&self, type_name: &str) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_unresolved(type_name));
        }
        fold(first)
    }

    fn on_manifest(&self, manifest: Option<&Manifest>) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_manifest(manifest));
        }
        fold(first)
    }

    fn on_resource(&self, name: &str) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_resource(name));
        }
        fold(first)
    }
}

/// Forwards every event to all listeners in order, with the same
/// no-short-circuit contract as [`CompoundErrorHandler`].
#[derive(Default)]
pub struct CompoundListener {
    delegates: Vec<Arc<dyn Listener>>,
}

impl CompoundListener {
    pub fn new(delegates: Vec<Arc<dyn Listener>>) -> CompoundListener {
        CompoundListener { delegates }
    }
}

impl ErrorHandler for CompoundListener {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_error(type_description, plugin, error));
        }
        fold(first)
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_type_error(type_description, errors));
        }
        fold(first)
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_batch_error(failed));
        }
        fold(first)
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_plugin_error(plugin, error));
        }
        fold(first)
    }

    fn on_live_initializer(
        &self,
        type_description: &TypeDescription,
        defining_type: &TypeDescription,
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(
                &mut first,
                delegate.on_live_initializer(type_description, defining_type),
            );
        }
        fold(first)
    }

    fn on_unresolved(&self, type_name: &str) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_unresolved(type_name));
        }
        fold(first)
    }

    fn on_manifest(&self, manifest: Option<&Manifest>) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_manifest(manifest));
        }
        fold(first)
    }

    fn on_resource(&self, name: &str) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_resource(name));
        }
        fold(first)
    }
}

impl Listener for CompoundListener {
    fn on_discovery(&self, type_name: &str) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_discovery(type_name));
        }
        fold(first)
    }

    fn on_transformation(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_transformation(type_description, plugin));
        }
        fold(first)
    }

    fn on_transformed(
        &self,
        type_description: &TypeDescription,
        plugins: &[String],
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_transformed(type_description, plugins));
        }
        fold(first)
    }

    fn on_ignored(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
    ) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_ignored(type_description, plugin));
        }
        fold(first)
    }

    fn on_unmatched(&self, type_description: &TypeDescription) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_unmatched(type_description));
        }
        fold(first)
    }

    fn on_complete(&self, type_description: &TypeDescription) -> Result<(), EngineError> {
        let mut first = None;
        for delegate in &self.delegates {
            keep_first(&mut first, delegate.on_complete(type_description));
        }
        fold(first)
    }
}

/// Adapts an error handler into a listener that forwards the applicable
/// events.
pub struct ForErrorHandler {
    delegate: Arc<dyn ErrorHandler>,
}

impl ForErrorHandler {
    pub fn new(delegate: Arc<dyn ErrorHandler>) -> ForErrorHandler {
        ForErrorHandler { delegate }
    }
}

impl ErrorHandler for ForErrorHandler {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        self.delegate.on_error(type_description, plugin, error)
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        self.delegate.on_type_error(type_description, errors)
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        self.delegate.on_batch_error(failed)
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        self.delegate.on_plugin_error(plugin, error)
    }

    fn on_live_initializer(
        &self,
        type_description: &TypeDescription,
        defining_type: &TypeDescription,
    ) -> Result<(), EngineError> {
        self.delegate
            .on_live_initializer(type_description, defining_type)
    }

    fn on_unresolved(&self, type_name: &str) -> Result<(), EngineError> {
        self.delegate.on_unresolved(type_name)
    }

    fn on_manifest(&self, manifest: Option<&Manifest>) -> Result<(), EngineError> {
        self.delegate.on_manifest(manifest)
    }

    fn on_resource(&self, name: &str) -> Result<(), EngineError> {
        self.delegate.on_resource(name)
    }
}

impl Listener for ForErrorHandler {}

/// Renders every event as a single human-readable line to an output
/// stream. Write failures never abort the run.
pub struct StreamWriting {
    writer: Mutex<Box<dyn Write + Send>>,
}

const PREFIX: &str = "[weave]";

impl StreamWriting {
    pub fn new(writer: Box<dyn Write + Send>) -> StreamWriting {
        StreamWriting {
            writer: Mutex::new(writer),
        }
    }

    pub fn to_stdout() -> StreamWriting {
        StreamWriting::new(Box::new(std::io::stdout()))
    }

    pub fn to_stderr() -> StreamWriting {
        StreamWriting::new(Box::new(std::io::stderr()))
    }

    /// Wraps this listener so that only transformation and error events
    /// are printed.
    pub fn with_transformations_only(self) -> WithTransformationsOnly {
        WithTransformationsOnly::new(Arc::new(self))
    }

    /// Wraps this listener so that only error events are printed.
    pub fn with_errors_only(self) -> WithErrorsOnly {
        WithErrorsOnly::new(Arc::new(self))
    }

    fn line(&self, message: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = message(writer.as_mut());
        }
    }
}

impl ErrorHandler for StreamWriting {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        self.line(|writer| {
            writeln!(
                writer,
                "{PREFIX} ERROR {type_description} for {plugin}: {error}"
            )
        });
        Ok(())
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        self.line(|writer| {
            writeln!(
                writer,
                "{PREFIX} ERROR {type_description}: {} error(s)",
                errors.len()
            )
        });
        Ok(())
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} ERROR {} type(s) failed", failed.len()));
        Ok(())
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} ERROR {plugin}: {error}"));
        Ok(())
    }

    fn on_live_initializer(
        &self,
        type_description: &TypeDescription,
        defining_type: &TypeDescription,
    ) -> Result<(), EngineError> {
        self.line(|writer| {
            writeln!(writer, "{PREFIX} LIVE {type_description} on {defining_type}")
        });
        Ok(())
    }

    fn on_unresolved(&self, type_name: &str) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} UNRESOLVED {type_name}"));
        Ok(())
    }

    fn on_manifest(&self, manifest: Option<&Manifest>) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} MANIFEST {}", manifest.is_some()));
        Ok(())
    }

    fn on_resource(&self, name: &str) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} RESOURCE {name}"));
        Ok(())
    }
}

impl Listener for StreamWriting {
    fn on_discovery(&self, type_name: &str) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} DISCOVERY {type_name}"));
        Ok(())
    }

    fn on_transformation(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
    ) -> Result<(), EngineError> {
        self.line(|writer| {
            writeln!(writer, "{PREFIX} TRANSFORM {type_description} for {plugin}")
        });
        Ok(())
    }

    fn on_transformed(
        &self,
        type_description: &TypeDescription,
        plugins: &[String],
    ) -> Result<(), EngineError> {
        self.line(|writer| {
            writeln!(
                writer,
                "{PREFIX} TRANSFORMED {type_description} by {}",
                plugins.join(", ")
            )
        });
        Ok(())
    }

    fn on_ignored(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
    ) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} IGNORE {type_description} for {plugin}"));
        Ok(())
    }

    fn on_unmatched(&self, type_description: &TypeDescription) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} UNMATCHED {type_description}"));
        Ok(())
    }

    fn on_complete(&self, type_description: &TypeDescription) -> Result<(), EngineError> {
        self.line(|writer| writeln!(writer, "{PREFIX} COMPLETE {type_description}"));
        Ok(())
    }
}

/// A decorator that forwards only transformation and error events.
pub struct WithTransformationsOnly {
    delegate: Arc<dyn Listener>,
}

impl WithTransformationsOnly {
    pub fn new(delegate: Arc<dyn Listener>) -> WithTransformationsOnly {
        WithTransformationsOnly { delegate }
    }
}

impl ErrorHandler for WithTransformationsOnly {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        self.delegate.on_error(type_description, plugin, error)
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        self.delegate.on_type_error(type_description, errors)
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        self.delegate.on_batch_error(failed)
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        self.delegate.on_plugin_error(plugin, error)
    }
}

impl Listener for WithTransformationsOnly {
    fn on_transformation(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
    ) -> Result<(), EngineError> {
        self.delegate.on_transformation(type_description, plugin)
    }

    fn on_transformed(
        &self,
        type_description: &TypeDescription,
        plugins: &[String],
    ) -> Result<(), EngineError> {
        self.delegate.on_transformed(type_description, plugins)
    }
}

/// A decorator that forwards only error events.
pub struct WithErrorsOnly {
    delegate: Arc<dyn Listener>,
}

impl WithErrorsOnly {
    pub fn new(delegate: Arc<dyn Listener>) -> WithErrorsOnly {
        WithErrorsOnly { delegate }
    }
}

impl ErrorHandler for WithErrorsOnly {
    fn on_error(
        &self,
        type_description: &TypeDescription,
        plugin: &str,
        error: &PluginError,
    ) -> Result<(), EngineError> {
        self.delegate.on_error(type_description, plugin, error)
    }

    fn on_type_error(
        &self,
        type_description: &TypeDescription,
        errors: &[PluginError],
    ) -> Result<(), EngineError> {
        self.delegate.on_type_error(type_description, errors)
    }

    fn on_batch_error(&self, failed: &Failures) -> Result<(), EngineError> {
        self.delegate.on_batch_error(failed)
    }

    fn on_plugin_error(&self, plugin: &str, error: &PluginError) -> Result<(), EngineError> {
        self.delegate.on_plugin_error(plugin, error)
    }
}

impl Listener for WithErrorsOnly {}
