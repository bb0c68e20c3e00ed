//! In-process fake runtime for tests
//!
//! Dependent crates get it through the `testing` feature, usually enabled
//! from their dev-dependencies.
//!
//! [`FakeRuntime`] mimics the JNI behaviour the bridge relies on without a
//! JVM: handles are distinct fake addresses that are never dereferenced,
//! lookups consult tables the test fills in, and failed lookups leave a
//! pending "exception" on the calling environment. `ExceptionDescribe`
//! clears the pending exception, as HotSpot's does.

use crate::bootstrap::VmInitArgs;
use crate::diagnostics::{Level, LogSink};
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ClassRef, EnvHandle, MethodId, ObjectRef, VmHandle};
use crate::runtime::JavaRuntime;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::ffi::CStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Serializes tests that change the global log threshold or sink
#[cfg(test)]
pub(crate) static DIAGNOSTICS_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Signature of `ClassLoader.loadClass`
const LOAD_CLASS_SIG: &str = "(Ljava/lang/String;)Ljava/lang/Class;";

#[derive(Default)]
struct FakeState {
    attach_failure: Option<i32>,
    create_failure: Option<i32>,
    classes: FxHashMap<String, ClassRef>,
    loader_classes: FxHashMap<String, ClassRef>,
    methods: FxHashMap<(ClassRef, String, String, bool), MethodId>,
    object_classes: FxHashMap<ObjectRef, ClassRef>,
    aliases: FxHashMap<ObjectRef, ObjectRef>,
    globals: FxHashSet<ObjectRef>,
    strings: FxHashMap<ObjectRef, String>,
    throwables: FxHashSet<ObjectRef>,
    pending: FxHashMap<usize, ObjectRef>,
    find_class_calls: Vec<String>,
    loader_calls: Vec<String>,
    loader: Option<ObjectRef>,
    load_class_method: Option<MethodId>,
    last_init_args: Option<VmInitArgs>,
}

impl FakeState {
    fn resolve(&self, object: ObjectRef) -> ObjectRef {
        self.aliases.get(&object).copied().unwrap_or(object)
    }
}

/// A scriptable stand-in for a JVM
pub struct FakeRuntime {
    vm: VmHandle,
    next_addr: AtomicUsize,
    attach_count: AtomicUsize,
    detach_count: AtomicUsize,
    method_lookups: AtomicUsize,
    describe_count: AtomicUsize,
    create_calls: AtomicUsize,
    state: Mutex<FakeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// Fresh fake with its own VM handle
    pub fn new() -> Self {
        let next_addr = AtomicUsize::new(0x1000);
        let vm_addr = next_addr.fetch_add(0x10, Ordering::Relaxed);
        FakeRuntime {
            vm: unsafe { fake_ptr(vm_addr, VmHandle::from_raw) },
            next_addr,
            attach_count: AtomicUsize::new(0),
            detach_count: AtomicUsize::new(0),
            method_lookups: AtomicUsize::new(0),
            describe_count: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn fresh_addr(&self) -> usize {
        self.next_addr.fetch_add(0x10, Ordering::Relaxed)
    }

    fn fresh_object(&self) -> ObjectRef {
        unsafe { fake_ptr(self.fresh_addr(), ObjectRef::from_raw) }
    }

    fn fresh_env(&self) -> EnvHandle {
        unsafe { fake_ptr(self.fresh_addr(), EnvHandle::from_raw) }
    }

    fn fresh_method(&self) -> MethodId {
        unsafe { fake_ptr(self.fresh_addr(), MethodId::from_raw) }
    }

    fn raise(&self, env: EnvHandle) {
        let throwable = self.fresh_object();
        let mut state = self.state.lock();
        state.throwables.insert(throwable);
        state.pending.insert(env.as_raw() as usize, throwable);
    }

    /// The VM this runtime reports
    pub fn vm(&self) -> VmHandle {
        self.vm
    }

    /// A VM handle that is not this runtime's VM
    pub fn foreign_vm(&self) -> VmHandle {
        unsafe { fake_ptr(self.fresh_addr(), VmHandle::from_raw) }
    }

    /// An environment as handed over by a host thread that is already attached
    pub fn host_env(&self) -> EnvHandle {
        self.fresh_env()
    }

    /// Create a host application context and classloader.
    ///
    /// The classloader answers `loadClass` from the classes registered with
    /// [`FakeRuntime::define_loader_class`].
    pub fn host_objects(&self) -> (ObjectRef, ObjectRef) {
        let context = self.fresh_object();
        let loader = self.fresh_object();
        let loader_class = self.fresh_object();
        let load_class = self.fresh_method();

        let mut state = self.state.lock();
        state.object_classes.insert(loader, loader_class);
        state.methods.insert(
            (loader_class, "loadClass".to_string(), LOAD_CLASS_SIG.to_string(), false),
            load_class,
        );
        state.loader = Some(loader);
        state.load_class_method = Some(load_class);
        (context, loader)
    }

    /// Make `name` (internal form) visible to `FindClass`
    pub fn define_class(&self, name: &str) -> ClassRef {
        let class = self.fresh_object();
        self.state.lock().classes.insert(name.to_string(), class);
        class
    }

    /// Make `name` (binary form) visible to the host classloader
    pub fn define_loader_class(&self, name: &str) -> ClassRef {
        let class = self.fresh_object();
        self.state.lock().loader_classes.insert(name.to_string(), class);
        class
    }

    /// Declare a method on `class`
    pub fn define_method(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
        is_static: bool,
    ) -> MethodId {
        let method = self.fresh_method();
        let mut state = self.state.lock();
        let class = state.resolve(class);
        state
            .methods
            .insert((class, name.to_string(), sig.to_string(), is_static), method);
        method
    }

    /// Make every following attach fail with `code`
    pub fn fail_attach_with(&self, code: i32) {
        self.state.lock().attach_failure = Some(code);
    }

    /// Let attaches succeed again
    pub fn allow_attach(&self) {
        self.state.lock().attach_failure = None;
    }

    /// Make VM creation fail with `code`
    pub fn fail_create_with(&self, code: i32) {
        self.state.lock().create_failure = Some(code);
    }

    /// Number of attach attempts, failed ones included
    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }

    /// Number of detaches
    pub fn detach_count(&self) -> usize {
        self.detach_count.load(Ordering::SeqCst)
    }

    /// Number of `GetMethodID`/`GetStaticMethodID` calls
    pub fn method_lookups(&self) -> usize {
        self.method_lookups.load(Ordering::SeqCst)
    }

    /// Number of `ExceptionDescribe` calls
    pub fn describe_count(&self) -> usize {
        self.describe_count.load(Ordering::SeqCst)
    }

    /// Number of `JNI_CreateJavaVM` calls
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Names passed to `FindClass`, in order
    pub fn find_class_calls(&self) -> Vec<String> {
        self.state.lock().find_class_calls.clone()
    }

    /// Names passed to `ClassLoader.loadClass`, in order
    pub fn loader_calls(&self) -> Vec<String> {
        self.state.lock().loader_calls.clone()
    }

    /// Java strings not yet deleted
    pub fn live_strings(&self) -> usize {
        self.state.lock().strings.len()
    }

    /// Live global references
    pub fn global_ref_count(&self) -> usize {
        self.state.lock().globals.len()
    }

    /// `IsSameObject`
    pub fn same_object(&self, a: ObjectRef, b: ObjectRef) -> bool {
        let state = self.state.lock();
        state.resolve(a) == state.resolve(b)
    }

    /// Whether `object` is a live global reference
    pub fn is_global(&self, object: ObjectRef) -> bool {
        self.state.lock().globals.contains(&object)
    }

    /// Whether `object` is a throwable raised by a failed lookup
    pub fn is_throwable(&self, object: ObjectRef) -> bool {
        let state = self.state.lock();
        state.throwables.contains(&state.resolve(object))
    }

    /// Arguments of the last VM creation
    pub fn last_init_args(&self) -> Option<VmInitArgs> {
        self.state.lock().last_init_args.clone()
    }
}

/// Build a handle from a fake, non-null address
unsafe fn fake_ptr<P, T>(addr: usize, wrap: unsafe fn(*mut P) -> Option<T>) -> T {
    match wrap(addr as *mut P) {
        Some(handle) => handle,
        None => unreachable!("fake addresses start at 0x1000"),
    }
}

impl JavaRuntime for FakeRuntime {
    fn attach_current_thread(&self, vm: VmHandle) -> Result<EnvHandle, i32> {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        if vm != self.vm {
            return Err(jni::sys::JNI_EINVAL);
        }
        if let Some(code) = self.state.lock().attach_failure {
            return Err(code);
        }
        Ok(self.fresh_env())
    }

    fn detach_current_thread(&self, _vm: VmHandle) -> Result<(), i32> {
        self.detach_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn java_vm(&self, _env: EnvHandle) -> Option<VmHandle> {
        Some(self.vm)
    }

    fn find_class(&self, env: EnvHandle, name: &CStr) -> Option<ClassRef> {
        let name = name.to_string_lossy().into_owned();
        let found = {
            let mut state = self.state.lock();
            state.find_class_calls.push(name.clone());
            state.classes.get(&name).copied()
        };
        if found.is_none() {
            self.raise(env);
        }
        found
    }

    fn new_string_utf(&self, _env: EnvHandle, value: &CStr) -> Option<ObjectRef> {
        let string = self.fresh_object();
        self.state
            .lock()
            .strings
            .insert(string, value.to_string_lossy().into_owned());
        Some(string)
    }

    fn call_object_method(
        &self,
        env: EnvHandle,
        target: ObjectRef,
        method: MethodId,
        args: &[ObjectRef],
    ) -> Option<ObjectRef> {
        let found = {
            let mut state = self.state.lock();
            let is_load_class = state.load_class_method == Some(method)
                && state.loader == Some(state.resolve(target));
            let name = args.first().and_then(|arg| state.strings.get(arg).cloned());
            match (is_load_class, name) {
                (true, Some(name)) => {
                    state.loader_calls.push(name.clone());
                    state.loader_classes.get(&name).copied()
                }
                _ => None,
            }
        };
        if found.is_none() {
            self.raise(env);
        }
        found
    }

    fn object_class(&self, _env: EnvHandle, object: ObjectRef) -> Option<ClassRef> {
        let state = self.state.lock();
        state.object_classes.get(&state.resolve(object)).copied()
    }

    fn method_id(
        &self,
        env: EnvHandle,
        class: ClassRef,
        name: &CStr,
        sig: &CStr,
    ) -> Option<MethodId> {
        self.lookup_method(env, class, name, sig, false)
    }

    fn static_method_id(
        &self,
        env: EnvHandle,
        class: ClassRef,
        name: &CStr,
        sig: &CStr,
    ) -> Option<MethodId> {
        self.lookup_method(env, class, name, sig, true)
    }

    fn new_global_ref(&self, _env: EnvHandle, object: ObjectRef) -> Option<ObjectRef> {
        let global = self.fresh_object();
        let mut state = self.state.lock();
        let target = state.resolve(object);
        state.aliases.insert(global, target);
        state.globals.insert(global);
        Some(global)
    }

    fn delete_global_ref(&self, _env: EnvHandle, object: ObjectRef) {
        let mut state = self.state.lock();
        state.globals.remove(&object);
        state.aliases.remove(&object);
    }

    fn delete_local_ref(&self, _env: EnvHandle, object: ObjectRef) {
        self.state.lock().strings.remove(&object);
    }

    fn exception_occurred(&self, env: EnvHandle) -> Option<ObjectRef> {
        self.state.lock().pending.get(&(env.as_raw() as usize)).copied()
    }

    fn exception_describe(&self, env: EnvHandle) {
        self.describe_count.fetch_add(1, Ordering::SeqCst);
        self.state.lock().pending.remove(&(env.as_raw() as usize));
    }

    fn exception_clear(&self, env: EnvHandle) {
        self.state.lock().pending.remove(&(env.as_raw() as usize));
    }

    fn throw(&self, env: EnvHandle, throwable: ObjectRef) -> bool {
        self.state
            .lock()
            .pending
            .insert(env.as_raw() as usize, throwable);
        true
    }

    fn create_java_vm(&self, args: &VmInitArgs) -> BridgeResult<(VmHandle, EnvHandle)> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let failure = {
            let mut state = self.state.lock();
            state.last_init_args = Some(args.clone());
            state.create_failure
        };
        if let Some(code) = failure {
            return Err(BridgeError::VmCreation(code));
        }
        Ok((self.vm, self.fresh_env()))
    }
}

impl FakeRuntime {
    fn lookup_method(
        &self,
        env: EnvHandle,
        class: ClassRef,
        name: &CStr,
        sig: &CStr,
        is_static: bool,
    ) -> Option<MethodId> {
        self.method_lookups.fetch_add(1, Ordering::SeqCst);
        let found = {
            let state = self.state.lock();
            let key = (
                state.resolve(class),
                name.to_string_lossy().into_owned(),
                sig.to_string_lossy().into_owned(),
                is_static,
            );
            state.methods.get(&key).copied()
        };
        if found.is_none() {
            self.raise(env);
        }
        found
    }
}

/// Sink recording every accepted message
#[derive(Clone, Default)]
pub struct CaptureSink {
    messages: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CaptureSink {
    /// Empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything captured so far
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.lock().clone()
    }

    /// Captured messages containing `marker`
    pub fn messages_containing(&self, marker: &str) -> Vec<(Level, String)> {
        self.messages
            .lock()
            .iter()
            .filter(|(_, message)| message.contains(marker))
            .cloned()
            .collect()
    }
}

impl LogSink for CaptureSink {
    fn write(&self, level: Level, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }
}
