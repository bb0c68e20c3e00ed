//! Process-wide VM registry
//!
//! Holds the VM handle, the host's embedding context and the memoized
//! `ClassLoader.loadClass` method ID. Each cell is written once and read
//! lock-free afterwards.

use crate::handle::{MethodId, ObjectRef, VmHandle};
use once_cell::sync::OnceCell;

/// References supplied by a managed host, held as JNI global references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingContext {
    /// Classloader of the embedding application
    pub class_loader: ObjectRef,
    /// Application context object, if the host supplied one
    pub app_context: Option<ObjectRef>,
}

/// How class names are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// `FindClass` through the calling thread's environment
    DirectLookup,
    /// `loadClass` on the host classloader
    ClassLoader(EmbeddingContext),
}

/// Write-once process state
#[derive(Debug, Default)]
pub struct Registry {
    vm: OnceCell<VmHandle>,
    embedding: OnceCell<EmbeddingContext>,
    load_class_method: OnceCell<MethodId>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered VM, if any
    pub fn vm(&self) -> Option<VmHandle> {
        self.vm.get().copied()
    }

    /// Record the VM.
    ///
    /// Returns `false` if a different VM is already registered; re-storing
    /// the registered VM is accepted.
    pub fn store_vm(&self, vm: VmHandle) -> bool {
        match self.vm.try_insert(vm) {
            Ok(_) => true,
            Err((existing, _)) => *existing == vm,
        }
    }

    /// Host embedding context, if running in managed-host mode
    pub fn embedding(&self) -> Option<EmbeddingContext> {
        self.embedding.get().copied()
    }

    /// Record the embedding context. Returns `false` if one is already set.
    pub fn store_embedding(&self, context: EmbeddingContext) -> bool {
        self.embedding.set(context).is_ok()
    }

    /// Host classloader
    pub fn class_loader(&self) -> Option<ObjectRef> {
        self.embedding().map(|ctx| ctx.class_loader)
    }

    /// Host application context
    pub fn app_context(&self) -> Option<ObjectRef> {
        self.embedding().and_then(|ctx| ctx.app_context)
    }

    /// Resolution strategy implied by the registered context
    pub fn strategy(&self) -> ResolutionStrategy {
        match self.embedding() {
            Some(ctx) => ResolutionStrategy::ClassLoader(ctx),
            None => ResolutionStrategy::DirectLookup,
        }
    }

    /// Memoized `loadClass` method ID
    pub fn load_class_method(&self) -> Option<MethodId> {
        self.load_class_method.get().copied()
    }

    /// Memoize `loadClass`, returning whichever ID was stored first
    pub fn store_load_class_method(&self, method: MethodId) -> MethodId {
        match self.load_class_method.try_insert(method) {
            Ok(stored) => *stored,
            Err((existing, _)) => *existing,
        }
    }
}
