//! JVM bridge core
//!
//! This crate lets a native host obtain and reuse the single Java VM of the
//! process from any thread:
//! - Process-wide registry for the VM handle and the embedding context
//! - Lazy per-thread attachment with a thread-local environment cache
//! - Class resolution through the host classloader or `FindClass`
//! - Standalone VM creation when no host owns a VM
//! - Severity-filtered diagnostics
//!
//! Everything that talks to a VM goes through the [`JavaRuntime`] trait.
//! [`JniRuntime`] is the real implementation on top of the `jni` crate. Tests
//! use the in-process fake from the `testing` module, compiled for this
//! crate's own tests and for dependents that enable the `testing` feature.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[macro_use]
pub mod diagnostics;

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod env;
pub mod error;
pub mod handle;
pub mod locator;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod sys;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bootstrap::VmInitArgs;
pub use bridge::{Bridge, BridgeId};
pub use config::BridgeConfig;
pub use diagnostics::{Level, LogSink};
pub use error::{BridgeError, BridgeResult};
pub use handle::{ClassRef, ClassSlot, EnvHandle, MethodId, MethodSlot, ObjectRef, VmHandle};
pub use locator::{JvmLocator, LoadError};
pub use registry::{EmbeddingContext, Registry, ResolutionStrategy};
pub use runtime::JavaRuntime;
pub use sys::JniRuntime;
