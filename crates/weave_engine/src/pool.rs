//! Type resolution with caching on top of a class file locator.

use crate::locator::ClassFileLocator;
use crate::types::TypeDescription;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use weave_classfile::ClassSummary;

/// How much of a class file is parsed when describing a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    /// Parses only the class header: name, super type, interfaces and
    /// access flags.
    Fast,
    /// Additionally parses declared field and method signatures.
    Extended,
}

/// When referenced types are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Types are resolved when first described.
    Lazy,
    /// Describing a type immediately resolves its super type and
    /// interfaces as well. This avoids repeated cache misses when most
    /// types end up being resolved anyway.
    Eager,
}

/// Determines how the engine creates a type pool for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStrategy {
    pub reader_mode: ReaderMode,
    pub resolution: ResolutionMode,
}

impl PoolStrategy {
    pub const LAZY_FAST: PoolStrategy = PoolStrategy {
        reader_mode: ReaderMode::Fast,
        resolution: ResolutionMode::Lazy,
    };
    pub const LAZY_EXTENDED: PoolStrategy = PoolStrategy {
        reader_mode: ReaderMode::Extended,
        resolution: ResolutionMode::Lazy,
    };
    pub const EAGER_FAST: PoolStrategy = PoolStrategy {
        reader_mode: ReaderMode::Fast,
        resolution: ResolutionMode::Eager,
    };
    pub const EAGER_EXTENDED: PoolStrategy = PoolStrategy {
        reader_mode: ReaderMode::Extended,
        resolution: ResolutionMode::Eager,
    };

    /// Creates a pool over the given locator.
    pub fn pool(&self, locator: Arc<dyn ClassFileLocator>) -> TypePool {
        TypePool {
            locator,
            reader_mode: self.reader_mode,
            resolution: self.resolution,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for PoolStrategy {
    fn default() -> Self {
        PoolStrategy::LAZY_FAST
    }
}

/// The result of describing a type name.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(TypeDescription),
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn into_resolved(self) -> Option<TypeDescription> {
        match self {
            Resolution::Resolved(type_description) => Some(type_description),
            Resolution::Unresolved => None,
        }
    }
}

/// A caching resolver of type names to type descriptions. Bytes that exist
/// but cannot be parsed, or whose declared name does not match the
/// requested name, resolve as unresolved.
pub struct TypePool {
    locator: Arc<dyn ClassFileLocator>,
    reader_mode: ReaderMode,
    resolution: ResolutionMode,
    cache: Mutex<HashMap<String, Resolution>>,
}

impl TypePool {
    /// Describes a type by its binary name.
    pub fn describe(&self, type_name: &str) -> Resolution {
        if let Some(resolution) = self.cache().get(type_name) {
            return resolution.clone();
        }
        let resolution = self.resolve(type_name);
        self.cache()
            .insert(type_name.to_string(), resolution.clone());
        if self.resolution == ResolutionMode::Eager {
            if let Resolution::Resolved(type_description) = &resolution {
                let mut referenced: Vec<String> = Vec::new();
                referenced.extend(type_description.super_name().map(str::to_string));
                referenced.extend(type_description.interfaces().iter().cloned());
                for name in referenced {
                    self.describe(&name);
                }
            }
        }
        resolution
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Resolution>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn resolve(&self, type_name: &str) -> Resolution {
        let bytes = match self.locator.locate(type_name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(type_name, "no class file found");
                return Resolution::Unresolved;
            }
            Err(error) => {
                warn!(type_name, %error, "I/O failure while locating class file");
                return Resolution::Unresolved;
            }
        };
        let summary = match self.reader_mode {
            ReaderMode::Fast => ClassSummary::parse_header(&bytes),
            ReaderMode::Extended => ClassSummary::parse_full(&bytes),
        };
        match summary {
            Ok(summary) if summary.binary_name == type_name => {
                Resolution::Resolved(TypeDescription::from_summary(summary))
            }
            Ok(summary) => {
                warn!(
                    type_name,
                    declared = %summary.binary_name,
                    "class file declares a different type name"
                );
                Resolution::Unresolved
            }
            Err(error) => {
                warn!(type_name, %error, "failed to parse class file");
                Resolution::Unresolved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Simple;
    use weave_classfile::ClassFile;

    fn locator_with(classes: &[(&str, &str)]) -> Arc<dyn ClassFileLocator> {
        Arc::new(Simple::of_types(classes.iter().map(|(name, superclass)| {
            (
                name.to_string(),
                ClassFile::new(name, superclass).to_bytes(),
            )
        })))
    }

    #[test]
    fn resolves_and_caches_types() {
        let pool =
            PoolStrategy::LAZY_FAST.pool(locator_with(&[("a.B", "java.lang.Object")]));
        let resolution = pool.describe("a.B");
        assert!(resolution.is_resolved());
        let description = resolution.into_resolved().expect("resolved");
        assert_eq!(description.name(), "a.B");
        assert_eq!(description.super_name(), Some("java.lang.Object"));
        assert!(pool.describe("a.B").is_resolved());
    }

    #[test]
    fn missing_types_are_unresolved() {
        let pool = PoolStrategy::LAZY_FAST.pool(Arc::new(crate::locator::NoOp));
        assert!(!pool.describe("a.B").is_resolved());
    }

    #[test]
    fn unparseable_bytes_are_unresolved() {
        let pool = PoolStrategy::LAZY_FAST.pool(Arc::new(Simple::of_types([(
            "a.B".to_string(),
            vec![0u8; 8],
        )])));
        assert!(!pool.describe("a.B").is_resolved());
    }

    #[test]
    fn mismatched_declared_name_is_unresolved() {
        let pool = PoolStrategy::LAZY_FAST.pool(Arc::new(Simple::of_types([(
            "a.B".to_string(),
            ClassFile::new("a.C", "java.lang.Object").to_bytes(),
        )])));
        assert!(!pool.describe("a.B").is_resolved());
    }

    #[test]
    fn eager_resolution_fills_the_cache_with_referenced_types() {
        let locator = locator_with(&[("a.B", "a.Base"), ("a.Base", "java.lang.Object")]);
        let pool = PoolStrategy::EAGER_FAST.pool(locator);
        assert!(pool.describe("a.B").is_resolved());
        assert!(pool.cache().contains_key("a.Base"));
        assert!(pool.cache().contains_key("java.lang.Object"));
    }
}
