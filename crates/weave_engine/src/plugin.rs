//! The plugin contract and plugin factories.

use crate::builder::TypeBuilder;
use crate::error::{EngineError, PluginError};
use crate::locator::ClassFileLocator;
use crate::types::TypeDescription;
use std::sync::Arc;

/// A rewrite rule that is matched against every discovered type and, where
/// it matches, transforms the type's builder.
///
/// A plugin instance may be invoked from a worker thread for different
/// types concurrently; implementations that keep mutable state must
/// synchronize it themselves. Within a single type, plugins are always
/// applied serially and in configuration order.
pub trait Plugin: Send + Sync {
    /// A stable name used in events, logs and error messages.
    fn name(&self) -> &str;

    /// Decides whether this plugin applies to the given type.
    fn matches(&self, type_description: &TypeDescription) -> Result<bool, PluginError>;

    /// Transforms the builder for a matched type. The returned builder is
    /// handed to the next matching plugin.
    fn apply(
        &self,
        builder: TypeBuilder,
        type_description: &TypeDescription,
        class_file_locator: &dyn ClassFileLocator,
    ) -> Result<TypeBuilder, PluginError>;

    /// Whether this plugin needs to observe every resolved type before
    /// types are materialized. When any configured plugin requires
    /// preprocessing, the engine defers materialization; under serial
    /// dispatch every type is preprocessed before the first
    /// transformation runs, under parallel dispatch preprocessing and
    /// transformation of different types may interleave.
    fn requires_preprocessing(&self) -> bool {
        false
    }

    /// Observes a resolved type ahead of transformation. Only invoked when
    /// [`Plugin::requires_preprocessing`] returns `true`.
    fn preprocess(
        &self,
        _type_description: &TypeDescription,
        _class_file_locator: &dyn ClassFileLocator,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Releases any resources held by this plugin. Invoked exactly once at
    /// the end of an engine run, whether or not the plugin ever matched.
    fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// A non-operational plugin that matches no type. Also usable as its own
/// factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl Plugin for NoOp {
    fn name(&self) -> &str {
        "NoOp"
    }

    fn matches(&self, _type_description: &TypeDescription) -> Result<bool, PluginError> {
        Ok(false)
    }

    fn apply(
        &self,
        _builder: TypeBuilder,
        _type_description: &TypeDescription,
        _class_file_locator: &dyn ClassFileLocator,
    ) -> Result<TypeBuilder, PluginError> {
        Err("cannot apply non-operational plugin".into())
    }
}

impl PluginFactory for NoOp {
    fn make(&self) -> Result<Arc<dyn Plugin>, EngineError> {
        Ok(Arc::new(NoOp))
    }
}

/// Constructs plugin instances for an engine run.
pub trait PluginFactory: Send + Sync {
    fn make(&self) -> Result<Arc<dyn Plugin>, EngineError>;
}

/// A factory that hands out a pre-built plugin instance.
pub struct Simple {
    plugin: Arc<dyn Plugin>,
}

impl Simple {
    pub fn new(plugin: Arc<dyn Plugin>) -> Simple {
        Simple { plugin }
    }

    pub fn of(plugin: impl Plugin + 'static) -> Simple {
        Simple {
            plugin: Arc::new(plugin),
        }
    }
}

impl PluginFactory for Simple {
    fn make(&self) -> Result<Arc<dyn Plugin>, EngineError> {
        Ok(self.plugin.clone())
    }
}

/// The primitive kinds a constructor parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Bool,
    Int,
    Float,
    Str,
}

/// A resolved constructor argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ArgumentValue {
    fn kind(&self) -> ParameterKind {
        match self {
            ArgumentValue::Bool(_) => ParameterKind::Bool,
            ArgumentValue::Int(_) => ParameterKind::Int,
            ArgumentValue::Float(_) => ParameterKind::Float,
            ArgumentValue::Str(_) => ParameterKind::Str,
        }
    }
}

/// Resolves constructor arguments by parameter index and declared kind.
/// Resolvers are tried in order; the first resolver that produces a value
/// wins.
pub trait ArgumentResolver: Send + Sync {
    fn resolve(&self, index: usize, kind: ParameterKind) -> Option<ArgumentValue>;
}

/// Resolves every parameter whose declared kind matches the value's kind.
pub struct ForKind {
    value: ArgumentValue,
}

impl ForKind {
    pub fn new(value: ArgumentValue) -> ForKind {
        ForKind { value }
    }
}

impl ArgumentResolver for ForKind {
    fn resolve(&self, _index: usize, kind: ParameterKind) -> Option<ArgumentValue> {
        (self.value.kind() == kind).then(|| self.value.clone())
    }
}

/// Resolves a specific parameter index with a typed value.
pub struct ForIndex {
    index: usize,
    value: ArgumentValue,
}

impl ForIndex {
    pub fn new(index: usize, value: ArgumentValue) -> ForIndex {
        ForIndex { index, value }
    }
}

impl ArgumentResolver for ForIndex {
    fn resolve(&self, index: usize, kind: ParameterKind) -> Option<ArgumentValue> {
        (self.index == index && self.value.kind() == kind).then(|| self.value.clone())
    }
}

/// Resolves a specific parameter index from a string representation,
/// coercing the string to whatever kind the parameter declares.
pub struct ForIndexDynamic {
    index: usize,
    value: String,
}

impl ForIndexDynamic {
    pub fn new(index: usize, value: impl Into<String>) -> ForIndexDynamic {
        ForIndexDynamic {
            index,
            value: value.into(),
        }
    }
}

impl ArgumentResolver for ForIndexDynamic {
    fn resolve(&self, index: usize, kind: ParameterKind) -> Option<ArgumentValue> {
        if self.index != index {
            return None;
        }
        match kind {
            ParameterKind::Bool => self.value.parse().ok().map(ArgumentValue::Bool),
            ParameterKind::Int => self.value.parse().ok().map(ArgumentValue::Int),
            ParameterKind::Float => self.value.parse().ok().map(ArgumentValue::Float),
            ParameterKind::Str => Some(ArgumentValue::Str(self.value.clone())),
        }
    }
}

type Construct =
    dyn Fn(Vec<ArgumentValue>) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync;

/// One declared way of constructing a plugin: a parameter list, a priority
/// for tie-breaking, and the construction function itself.
pub struct Constructor {
    parameters: Vec<ParameterKind>,
    priority: i32,
    construct: Box<Construct>,
}

impl Constructor {
    /// The priority assumed for constructors without an explicit one.
    pub const DEFAULT_PRIORITY: i32 = 0;

    pub fn new(
        parameters: Vec<ParameterKind>,
        construct: impl Fn(Vec<ArgumentValue>) -> Result<Arc<dyn Plugin>, PluginError>
            + Send
            + Sync
            + 'static,
    ) -> Constructor {
        Constructor {
            parameters,
            priority: Self::DEFAULT_PRIORITY,
            construct: Box::new(construct),
        }
    }

    /// A constructor with a higher priority wins over resolvable
    /// constructors with a lower one.
    pub fn with_priority(mut self, priority: i32) -> Constructor {
        self.priority = priority;
        self
    }
}

/// A factory that selects among declared constructors by resolving each
/// parameter through a chain of argument resolvers. Exactly one
/// most-preferred constructor must be fully resolvable; anything else is a
/// configuration error.
pub struct WithArguments {
    plugin_name: String,
    constructors: Vec<Constructor>,
    resolvers: Vec<Box<dyn ArgumentResolver>>,
}

impl WithArguments {
    pub fn new(plugin_name: impl Into<String>) -> WithArguments {
        WithArguments {
            plugin_name: plugin_name.into(),
            constructors: Vec::new(),
            resolvers: Vec::new(),
        }
    }

    pub fn with_constructor(mut self, constructor: Constructor) -> WithArguments {
        self.constructors.push(constructor);
        self
    }

    pub fn with_resolver(mut self, resolver: impl ArgumentResolver + 'static) -> WithArguments {
        self.resolvers.push(Box::new(resolver));
        self
    }

    fn resolve_arguments(&self, constructor: &Constructor) -> Option<Vec<ArgumentValue>> {
        let mut arguments = Vec::with_capacity(constructor.parameters.len());
        for (index, kind) in constructor.parameters.iter().enumerate() {
            let argument = self
                .resolvers
                .iter()
                .find_map(|resolver| resolver.resolve(index, *kind))?;
            arguments.push(argument);
        }
        Some(arguments)
    }
}

impl PluginFactory for WithArguments {
    fn make(&self) -> Result<Arc<dyn Plugin>, EngineError> {
        let mut resolved: Vec<(&Constructor, Vec<ArgumentValue>)> = Vec::new();
        for constructor in &self.constructors {
            if let Some(arguments) = self.resolve_arguments(constructor) {
                resolved.push((constructor, arguments));
            }
        }
        let best = resolved
            .iter()
            .map(|(constructor, _)| constructor.priority)
            .max()
            .ok_or_else(|| EngineError::NoResolvableConstructor(self.plugin_name.clone()))?;
        resolved.retain(|(constructor, _)| constructor.priority == best);
        if resolved.len() > 1 {
            return Err(EngineError::AmbiguousConstructor(self.plugin_name.clone()));
        }
        let (constructor, arguments) = resolved.remove(0);
        (constructor.construct)(arguments).map_err(|error| EngineError::PluginConstruction {
            plugin: self.plugin_name.clone(),
            message: error.to_string(),
        })
    }
}
