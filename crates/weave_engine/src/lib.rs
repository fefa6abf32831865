//! A build-time class file weaving engine.
//!
//! The engine reads candidate types and resources from a [`source::Source`]
//! (folder, jar, in-memory map, or compositions thereof), applies an
//! ordered list of [`plugin::Plugin`]s to every type they match, and
//! writes the results — plus untouched passthrough resources — to a
//! [`target::Target`], producing an [`engine::Summary`] of transformed,
//! failed and unresolved types.
//!
//! ```no_run
//! use std::sync::Arc;
//! use weave_engine::engine::Engine;
//! use weave_engine::plugin::{NoOp, PluginFactory, Simple};
//! use weave_engine::source;
//! use weave_engine::target;
//!
//! # fn main() -> Result<(), weave_engine::error::EngineError> {
//! let factories: Vec<Arc<dyn PluginFactory>> = vec![Arc::new(Simple::of(NoOp))];
//! let summary = Engine::new().apply(
//!     &source::ForFolder::new("build/classes"),
//!     &target::ForJarFile::new("build/woven.jar"),
//!     &factories,
//! )?;
//! assert!(summary.failed().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod discovery;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod listener;
pub mod locator;
pub mod manifest;
pub mod plugin;
pub mod pool;
pub mod source;
pub mod target;
pub mod types;

pub use builder::{DynamicType, TypeBuilder};
pub use engine::{Engine, Summary};
pub use error::{EngineError, ErrorKind, Failures, PluginError};
pub use listener::{Enforcing, ErrorHandler, Failing, Listener};
pub use locator::ClassFileLocator;
pub use manifest::Manifest;
pub use plugin::{Plugin, PluginFactory};
pub use pool::PoolStrategy;
pub use types::TypeDescription;
