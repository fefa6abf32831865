//! The plugin engine: ties together a source, a target, a type pool
//! strategy, plugins, error handlers, listeners and a dispatcher, and
//! produces a summary of the application.

use crate::builder::TypeBuilder;
use crate::dispatch::{
    lock_outcome, Dispatcher, DispatcherFactory, Materializable, Outcome, Processing,
    SerialDispatcherFactory, SharedOutcome,
};
use crate::error::{EngineError, Failures, PluginError};
use crate::listener::{
    CompoundErrorHandler, CompoundListener, Enforcing, ErrorHandler, Failing, ForErrorHandler,
    Listener, NoOp,
};
use crate::locator::{self, ClassFileLocator};
use crate::manifest::MANIFEST_NAME;
use crate::plugin::{Plugin, PluginFactory};
use crate::pool::{PoolStrategy, Resolution, TypePool};
use crate::source::{Element, Origin, Source};
use crate::target::{Sink, Target};
use crate::types::TypeDescription;
use crate::{dispatch, source, target};
use std::mem;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use weave_classfile::binary_name_for_path;

/// A predicate over type descriptions.
pub type TypeMatcher = dyn Fn(&TypeDescription) -> bool + Send + Sync;

/// The immutable result of an engine application.
#[derive(Debug, Default)]
pub struct Summary {
    transformed: Vec<TypeDescription>,
    failed: Failures,
    unresolved: Vec<String>,
}

impl Summary {
    /// All transformed types, in processing order. Under parallel dispatch
    /// this is completion order.
    pub fn transformed(&self) -> &[TypeDescription] {
        &self.transformed
    }

    /// All types that failed during transformation, with the errors that
    /// were caught for each.
    pub fn failed(&self) -> &Failures {
        &self.failed
    }

    /// Names of class file candidates that could not be resolved.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }
}

/// A configurable plugin engine. The default engine resolves types with a
/// fast, lazy pool, dispatches serially, and fails fast, on unresolved
/// types and on live initializers.
pub struct Engine {
    pool_strategy: PoolStrategy,
    class_file_locator: Arc<dyn ClassFileLocator>,
    listener: Arc<dyn Listener>,
    error_handler: Arc<dyn ErrorHandler>,
    dispatcher_factory: Arc<dyn DispatcherFactory>,
    ignored: Arc<TypeMatcher>,
    retain_unmatched: bool,
}

impl Default for Engine {
    fn default() -> Engine {
        Engine {
            pool_strategy: PoolStrategy::default(),
            class_file_locator: Arc::new(locator::NoOp),
            listener: Arc::new(NoOp),
            error_handler: Arc::new(CompoundErrorHandler::new(vec![
                Arc::new(Failing::FailFast),
                Arc::new(Enforcing::AllTypesResolved),
                Arc::new(Enforcing::NoLiveInitializers),
            ])),
            dispatcher_factory: Arc::new(SerialDispatcherFactory),
            ignored: Arc::new(|_: &TypeDescription| false),
            retain_unmatched: true,
        }
    }
}

impl Engine {
    pub fn new() -> Engine {
        Engine::default()
    }

    /// Replaces the pool strategy.
    pub fn with_pool_strategy(mut self, pool_strategy: PoolStrategy) -> Engine {
        self.pool_strategy = pool_strategy;
        self
    }

    /// Appends a class file locator that is queried after any previously
    /// registered locator and after the source itself.
    pub fn with_class_file_locator(
        mut self,
        class_file_locator: Arc<dyn ClassFileLocator>,
    ) -> Engine {
        self.class_file_locator = Arc::new(locator::Compound::new(vec![
            self.class_file_locator,
            class_file_locator,
        ]));
        self
    }

    /// Appends a listener.
    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Engine {
        self.listener = Arc::new(CompoundListener::new(vec![self.listener, listener]));
        self
    }

    /// Replaces all error handlers.
    pub fn with_error_handlers(
        mut self,
        error_handlers: Vec<Arc<dyn ErrorHandler>>,
    ) -> Engine {
        self.error_handler = Arc::new(CompoundErrorHandler::new(error_handlers));
        self
    }

    /// Removes all error handlers.
    pub fn without_error_handlers(self) -> Engine {
        self.with_error_handlers(Vec::new())
    }

    /// Replaces the dispatcher factory.
    pub fn with_dispatcher_factory(
        mut self,
        dispatcher_factory: Arc<dyn DispatcherFactory>,
    ) -> Engine {
        self.dispatcher_factory = dispatcher_factory;
        self
    }

    /// Dispatches transformations to a pool of the given number of worker
    /// threads.
    pub fn with_parallel_transformation(self, threads: usize) -> Engine {
        self.with_dispatcher_factory(Arc::new(dispatch::ParallelDispatcherFactory::new(
            threads,
        )))
    }

    /// Excludes all types matched by the given predicate, in addition to
    /// any previously registered exclusion.
    pub fn ignore(
        mut self,
        matcher: impl Fn(&TypeDescription) -> bool + Send + Sync + 'static,
    ) -> Engine {
        let previous = self.ignored;
        self.ignored = Arc::new(move |type_description: &TypeDescription| {
            (*previous)(type_description) || matcher(type_description)
        });
        self
    }

    /// Configures whether types that matched no plugin are copied to the
    /// target in their original form. Defaults to `true`.
    pub fn retain_unmatched_originals(mut self, retain: bool) -> Engine {
        self.retain_unmatched = retain;
        self
    }

    /// Applies this engine to a source and a target, constructing one
    /// plugin per factory. Every constructed plugin is closed exactly once
    /// before this method returns, whatever the outcome.
    pub fn apply(
        &self,
        source: &dyn Source,
        target: &dyn Target,
        factories: &[Arc<dyn PluginFactory>],
    ) -> Result<Summary, EngineError> {
        let listener: Arc<dyn Listener> = Arc::new(CompoundListener::new(vec![
            self.listener.clone(),
            Arc::new(ForErrorHandler::new(self.error_handler.clone())),
        ]));
        let mut plugins: Vec<Arc<dyn Plugin>> = Vec::with_capacity(factories.len());
        let result = {
            let plugins = &mut plugins;
            (|| {
                for factory in factories {
                    plugins.push(factory.make()?);
                }
                self.process(source, target, plugins, &listener)
            })()
        };
        let mut rethrown = None;
        for plugin in &plugins {
            if let Err(error) = plugin.close() {
                if let Err(chained) = listener.on_plugin_error(plugin.name(), &error) {
                    if rethrown.is_none() {
                        rethrown = Some(chained);
                    }
                }
            }
        }
        match (result, rethrown) {
            (Err(error), _) => Err(error),
            (Ok(summary), None) => Ok(summary),
            (Ok(_), Some(chained)) => Err(chained),
        }
    }

    /// Applies this engine to file system locations: an existing directory
    /// is treated as a folder, anything else as a jar file.
    pub fn apply_paths(
        &self,
        source: &Path,
        target: &Path,
        factories: &[Arc<dyn PluginFactory>],
    ) -> Result<Summary, EngineError> {
        let source: Box<dyn Source> = if source.is_dir() {
            Box::new(source::ForFolder::new(source))
        } else {
            Box::new(source::ForJarFile::new(source))
        };
        let target: Box<dyn Target> = if target.is_dir() {
            Box::new(target::ForFolder::new(target))
        } else {
            Box::new(target::ForJarFile::new(target))
        };
        self.apply(source.as_ref(), target.as_ref(), factories)
    }

    fn process(
        &self,
        source: &dyn Source,
        target: &dyn Target,
        plugins: &[Arc<dyn Plugin>],
        listener: &Arc<dyn Listener>,
    ) -> Result<Summary, EngineError> {
        let origin = source.read()?;
        match self.process_origin(origin.as_ref(), target, plugins, listener) {
            Ok(summary) => {
                origin.close()?;
                Ok(summary)
            }
            Err(error) => {
                let _ = origin.close();
                Err(error)
            }
        }
    }

    fn process_origin(
        &self,
        origin: &dyn Origin,
        target: &dyn Target,
        plugins: &[Arc<dyn Plugin>],
        listener: &Arc<dyn Listener>,
    ) -> Result<Summary, EngineError> {
        let class_file_locator: Arc<dyn ClassFileLocator> =
            Arc::new(locator::Compound::new(vec![
                origin.class_file_locator(),
                self.class_file_locator.clone(),
            ]));
        let type_pool = Arc::new(self.pool_strategy.pool(class_file_locator.clone()));
        let manifest = origin.manifest()?;
        listener.on_manifest(manifest.as_ref())?;
        let sink = target.write(manifest.as_ref())?;
        let outcome: SharedOutcome = Arc::new(Mutex::new(Outcome::new(sink)));

        let shared_plugins: Arc<[Arc<dyn Plugin>]> = plugins.to_vec().into();
        let preprocessors: Arc<[Arc<dyn Plugin>]> = plugins
            .iter()
            .filter(|plugin| plugin.requires_preprocessing())
            .cloned()
            .collect::<Vec<_>>()
            .into();
        let drain_immediately = preprocessors.is_empty();

        let result = (|| -> Result<(), EngineError> {
            let mut dispatcher = self.dispatcher_factory.make(outcome.clone())?;
            for element in origin.elements() {
                let element = element?;
                let name = element.name().trim_start_matches('/').to_string();
                if let Some(type_name) = binary_name_for_path(&name) {
                    let preprocessor = Preprocessor {
                        element,
                        type_name,
                        class_file_locator: class_file_locator.clone(),
                        type_pool: type_pool.clone(),
                        listener: listener.clone(),
                        plugins: shared_plugins.clone(),
                        preprocessors: preprocessors.clone(),
                        ignored: self.ignored.clone(),
                        retain_unmatched: self.retain_unmatched,
                    };
                    dispatcher.accept(
                        Box::new(move || preprocessor.preprocess()),
                        drain_immediately,
                    )?;
                } else if name != MANIFEST_NAME {
                    listener.on_resource(&name)?;
                    lock_outcome(&outcome)?.sink.retain(&element)?;
                }
            }
            dispatcher.complete()?;
            drop(dispatcher);
            let guard = lock_outcome(&outcome)?;
            if !guard.failed.is_empty() {
                listener.on_batch_error(&guard.failed)?;
            }
            Ok(())
        })();
        let close_result = lock_outcome(&outcome).and_then(|mut guard| guard.sink.close());
        result?;
        close_result?;

        let mut guard = lock_outcome(&outcome)?;
        debug!(
            transformed = guard.transformed.len(),
            failed = guard.failed.len(),
            unresolved = guard.unresolved.len(),
            "plugin engine application complete"
        );
        Ok(Summary {
            transformed: mem::take(&mut guard.transformed),
            failed: mem::take(&mut guard.failed),
            unresolved: mem::take(&mut guard.unresolved),
        })
    }
}

/// The first phase of per-type work: resolution, exclusion and plugin
/// preprocessing. Evaluates to the transformation closure.
struct Preprocessor {
    element: Element,
    type_name: String,
    class_file_locator: Arc<dyn ClassFileLocator>,
    type_pool: Arc<TypePool>,
    listener: Arc<dyn Listener>,
    plugins: Arc<[Arc<dyn Plugin>]>,
    preprocessors: Arc<[Arc<dyn Plugin>]>,
    ignored: Arc<TypeMatcher>,
    retain_unmatched: bool,
}

impl Preprocessor {
    fn preprocess(self) -> Result<Processing, EngineError> {
        let Preprocessor {
            element,
            type_name,
            class_file_locator,
            type_pool,
            listener,
            plugins,
            preprocessors,
            ignored,
            retain_unmatched,
        } = self;
        listener.on_discovery(&type_name)?;
        match type_pool.describe(&type_name) {
            Resolution::Resolved(type_description) => {
                if (*ignored)(&type_description) {
                    Ok(Box::new(move || {
                        let unmatched = listener.on_unmatched(&type_description);
                        let complete = listener.on_complete(&type_description);
                        unmatched?;
                        complete?;
                        Ok(if retain_unmatched {
                            Materializable::Retained(element)
                        } else {
                            Materializable::Discarded
                        })
                    }))
                } else {
                    for plugin in preprocessors.iter() {
                        if let Err(error) =
                            plugin.preprocess(&type_description, class_file_locator.as_ref())
                        {
                            let _ = listener.on_complete(&type_description);
                            return Err(EngineError::PluginApplication {
                                type_name: type_description.name().to_string(),
                                plugin: plugin.name().to_string(),
                                message: error.to_string(),
                            });
                        }
                    }
                    Ok(Box::new(move || {
                        let result = apply_plugins(
                            &element,
                            &type_description,
                            &class_file_locator,
                            &listener,
                            &plugins,
                            retain_unmatched,
                        );
                        let complete = listener.on_complete(&type_description);
                        match result {
                            Ok(materializable) => {
                                complete?;
                                Ok(materializable)
                            }
                            Err(error) => Err(error),
                        }
                    }))
                }
            }
            Resolution::Unresolved => Ok(Box::new(move || {
                listener.on_unresolved(&type_name)?;
                Ok(Materializable::Unresolved { element, type_name })
            })),
        }
    }
}

/// The second phase: applies every matching plugin in configuration order,
/// accumulating errors per type, and classifies the element.
fn apply_plugins(
    element: &Element,
    type_description: &TypeDescription,
    class_file_locator: &Arc<dyn ClassFileLocator>,
    listener: &Arc<dyn Listener>,
    plugins: &Arc<[Arc<dyn Plugin>]>,
    retain_unmatched: bool,
) -> Result<Materializable, EngineError> {
    let bytes = class_file_locator
        .locate(type_description.name())?
        .ok_or_else(|| EngineError::Unresolved(type_description.name().to_string()))?;
    let mut builder = TypeBuilder::from_bytes(type_description.clone(), &bytes).map_err(
        |source| EngineError::ClassFile {
            type_name: type_description.name().to_string(),
            source,
        },
    )?;
    let mut applied: Vec<String> = Vec::new();
    let mut errors: Vec<PluginError> = Vec::new();
    for plugin in plugins.iter() {
        match plugin.matches(type_description) {
            Ok(true) => {
                match plugin.apply(builder.clone(), type_description, class_file_locator.as_ref())
                {
                    Ok(next) => {
                        listener.on_transformation(type_description, plugin.name())?;
                        applied.push(plugin.name().to_string());
                        builder = next;
                    }
                    Err(error) => {
                        listener.on_error(type_description, plugin.name(), &error)?;
                        errors.push(error);
                    }
                }
            }
            Ok(false) => listener.on_ignored(type_description, plugin.name())?,
            Err(error) => {
                listener.on_error(type_description, plugin.name(), &error)?;
                errors.push(error);
            }
        }
    }
    if !errors.is_empty() {
        listener.on_type_error(type_description, &errors)?;
        Ok(Materializable::Failed {
            element: element.clone(),
            type_description: type_description.clone(),
            errors,
        })
    } else if !applied.is_empty() {
        let dynamic_type = builder.make();
        listener.on_transformed(type_description, &applied)?;
        for defining_type in dynamic_type.live_initializers() {
            listener.on_live_initializer(type_description, defining_type)?;
        }
        Ok(Materializable::Transformed(dynamic_type))
    } else {
        listener.on_unmatched(type_description)?;
        Ok(if retain_unmatched {
            Materializable::Retained(element.clone())
        } else {
            Materializable::Discarded
        })
    }
}
