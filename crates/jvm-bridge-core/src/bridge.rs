//! The bridge: one registry plus the runtime used to talk to the VM
//!
//! A process normally owns exactly one `Bridge` (the C library keeps it in a
//! static). Tests build as many as they like around fake runtimes; each
//! bridge has its own id so thread-local environment slots never leak
//! between them.
//!
//! Initialization (host discovery or [`Bridge::spawn`]) must happen before
//! any other thread asks for an environment or a class. This is a documented
//! precondition, not something the bridge locks around.

use crate::env;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{EnvHandle, ObjectRef, VmHandle};
use crate::registry::{EmbeddingContext, Registry, ResolutionStrategy};
use crate::runtime::JavaRuntime;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a Bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeId(u64);

impl BridgeId {
    /// Create a new unique bridge ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        BridgeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide VM state and the runtime behind it
pub struct Bridge<R> {
    id: BridgeId,
    runtime: R,
    registry: Registry,
}

impl<R: JavaRuntime> Bridge<R> {
    /// Create an uninitialized bridge
    pub fn new(runtime: R) -> Self {
        Bridge {
            id: BridgeId::new(),
            runtime,
            registry: Registry::new(),
        }
    }

    /// This bridge's id
    pub fn id(&self) -> BridgeId {
        self.id
    }

    /// The runtime
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The process VM, or `None` before initialization
    pub fn vm(&self) -> Option<VmHandle> {
        self.registry.vm()
    }

    /// Host classloader (managed-host mode only)
    pub fn class_loader(&self) -> Option<ObjectRef> {
        self.registry.class_loader()
    }

    /// Host application context (managed-host mode only)
    pub fn embedding_context(&self) -> Option<ObjectRef> {
        self.registry.app_context()
    }

    /// Active class resolution strategy
    pub fn strategy(&self) -> ResolutionStrategy {
        self.registry.strategy()
    }

    /// Record the VM and, in managed-host mode, the host's context and
    /// classloader.
    ///
    /// `env` must be the calling thread's environment when a classloader or
    /// context is given: both are promoted to global references here, once.
    /// A different VM than the registered one is refused with
    /// [`BridgeError::AlreadyRunning`]; a second embedding context is
    /// ignored and its references released.
    pub fn discover_or_store(
        &self,
        env: Option<EnvHandle>,
        vm: VmHandle,
        context: Option<ObjectRef>,
        class_loader: Option<ObjectRef>,
    ) -> BridgeResult<()> {
        if !self.registry.store_vm(vm) {
            jvm_warn!("Ignoring a second Java VM; the first registered VM stays in use");
            return Err(BridgeError::AlreadyRunning);
        }

        let Some(class_loader) = class_loader else {
            jvm_debug!("Registered Java VM for direct class lookup");
            return Ok(());
        };
        let env = env.ok_or(BridgeError::Jni("embedding context needs an environment"))?;

        let loader = self
            .runtime
            .new_global_ref(env, class_loader)
            .ok_or(BridgeError::Jni("NewGlobalRef(classLoader)"))?;
        let app_context = context.and_then(|ctx| self.runtime.new_global_ref(env, ctx));

        let embedding = EmbeddingContext {
            class_loader: loader,
            app_context,
        };
        if !self.registry.store_embedding(embedding) {
            jvm_warn!("Embedding context already registered; keeping the first one");
            self.runtime.delete_global_ref(env, loader);
            if let Some(ctx) = app_context {
                self.runtime.delete_global_ref(env, ctx);
            }
            return Ok(());
        }

        jvm_debug!("Registered Java VM with host classloader");
        Ok(())
    }

    /// Managed-host initialization callback.
    ///
    /// Called on a host thread that is already attached. The VM is discovered
    /// from its environment, and the environment is cached for that thread
    /// once the VM is the registered one. A refused VM leaves the thread's
    /// cache untouched.
    pub fn initialize_embedded(
        &self,
        env: EnvHandle,
        context: Option<ObjectRef>,
        class_loader: Option<ObjectRef>,
    ) -> BridgeResult<()> {
        let vm = self
            .runtime
            .java_vm(env)
            .ok_or(BridgeError::Jni("GetJavaVM"))?;
        let result = self.discover_or_store(Some(env), vm, context, class_loader);
        if self.vm() == Some(vm) {
            env::seed(self.id, env);
        }
        result
    }

    /// Register a VM handed over without an embedding context, as
    /// `JNI_OnLoad` does.
    pub fn register_vm(&self, vm: VmHandle) -> BridgeResult<()> {
        self.discover_or_store(None, vm, None, None)
    }
}

impl<R> std::fmt::Debug for Bridge<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    #[test]
    fn test_bridge_id_uniqueness() {
        let a = Bridge::new(FakeRuntime::new());
        let b = Bridge::new(FakeRuntime::new());
        assert_ne!(a.id(), b.id());
        assert!(a.id().as_u64() > 0);
    }

    #[test]
    fn test_uninitialized_bridge_has_no_state() {
        let bridge = Bridge::new(FakeRuntime::new());
        assert!(bridge.vm().is_none());
        assert!(bridge.class_loader().is_none());
        assert!(bridge.embedding_context().is_none());
        assert_eq!(bridge.strategy(), ResolutionStrategy::DirectLookup);
    }

    #[test]
    fn test_register_vm_selects_direct_lookup() {
        let runtime = FakeRuntime::new();
        let vm = runtime.vm();
        let bridge = Bridge::new(runtime);

        bridge.register_vm(vm).unwrap();
        assert_eq!(bridge.vm(), Some(vm));
        assert_eq!(bridge.strategy(), ResolutionStrategy::DirectLookup);
    }

    #[test]
    fn test_second_vm_is_refused() {
        let runtime = FakeRuntime::new();
        let vm = runtime.vm();
        let other = runtime.foreign_vm();
        let bridge = Bridge::new(runtime);

        bridge.register_vm(vm).unwrap();
        assert!(matches!(
            bridge.register_vm(other),
            Err(BridgeError::AlreadyRunning)
        ));
        assert_eq!(bridge.vm(), Some(vm));
    }

    #[test]
    fn test_refused_embedding_keeps_thread_cache_clean() {
        let runtime = FakeRuntime::new();
        let other = runtime.foreign_vm();
        let (context, loader) = runtime.host_objects();
        let host_env = runtime.host_env();
        let bridge = Bridge::new(runtime);

        bridge.register_vm(other).unwrap();
        assert!(matches!(
            bridge.initialize_embedded(host_env, Some(context), Some(loader)),
            Err(BridgeError::AlreadyRunning)
        ));

        assert!(!bridge.is_thread_attached());
        assert!(bridge.class_loader().is_none());
        // The host's environment belongs to the refused VM, so it is never
        // handed out for the registered one.
        assert!(!matches!(bridge.env(), Ok(env) if env == host_env));
        assert_eq!(bridge.runtime().global_ref_count(), 0);
    }

    #[test]
    fn test_embedding_after_onload_is_accepted() {
        let runtime = FakeRuntime::new();
        let vm = runtime.vm();
        let (context, loader) = runtime.host_objects();
        let host_env = runtime.host_env();
        let bridge = Bridge::new(runtime);

        bridge.register_vm(vm).unwrap();
        bridge
            .initialize_embedded(host_env, Some(context), Some(loader))
            .unwrap();

        let registered = bridge.class_loader().unwrap();
        assert!(bridge.runtime().same_object(registered, loader));
        assert!(bridge.runtime().is_global(registered));
        assert_eq!(bridge.env().unwrap(), host_env);
    }

    #[test]
    fn test_second_embedding_releases_references() {
        let runtime = FakeRuntime::new();
        let (context, loader) = runtime.host_objects();
        let host_env = runtime.host_env();
        let bridge = Bridge::new(runtime);

        bridge
            .initialize_embedded(host_env, Some(context), Some(loader))
            .unwrap();
        let globals = bridge.runtime().global_ref_count();

        bridge
            .initialize_embedded(host_env, Some(context), Some(loader))
            .unwrap();
        assert_eq!(bridge.runtime().global_ref_count(), globals);
    }
}
