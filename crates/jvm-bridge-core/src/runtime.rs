//! The JNI surface the bridge depends on
//!
//! [`JavaRuntime`] covers exactly the invocation and native interface calls
//! the registry, environment manager, resolver and bootstrap make. The real
//! implementation is [`crate::sys::JniRuntime`].

use crate::bootstrap::VmInitArgs;
use crate::error::BridgeResult;
use crate::handle::{ClassRef, EnvHandle, MethodId, ObjectRef, VmHandle};
use std::ffi::CStr;

/// Access to a Java runtime through JNI.
///
/// Methods taking an [`EnvHandle`] must be called on the thread owning that
/// environment, which the handle's `!Send` bound enforces.
pub trait JavaRuntime: Send + Sync {
    /// Attach the calling thread, returning its environment or the JNI error code
    fn attach_current_thread(&self, vm: VmHandle) -> Result<EnvHandle, i32>;

    /// Detach the calling thread
    fn detach_current_thread(&self, vm: VmHandle) -> Result<(), i32>;

    /// The VM owning `env`
    fn java_vm(&self, env: EnvHandle) -> Option<VmHandle>;

    /// `FindClass` with an internal (slash separated) name
    fn find_class(&self, env: EnvHandle, name: &CStr) -> Option<ClassRef>;

    /// `NewStringUTF`
    fn new_string_utf(&self, env: EnvHandle, value: &CStr) -> Option<ObjectRef>;

    /// `CallObjectMethodA` with object arguments
    fn call_object_method(
        &self,
        env: EnvHandle,
        target: ObjectRef,
        method: MethodId,
        args: &[ObjectRef],
    ) -> Option<ObjectRef>;

    /// `GetObjectClass`
    fn object_class(&self, env: EnvHandle, object: ObjectRef) -> Option<ClassRef>;

    /// `GetMethodID`
    fn method_id(&self, env: EnvHandle, class: ClassRef, name: &CStr, sig: &CStr)
        -> Option<MethodId>;

    /// `GetStaticMethodID`
    fn static_method_id(
        &self,
        env: EnvHandle,
        class: ClassRef,
        name: &CStr,
        sig: &CStr,
    ) -> Option<MethodId>;

    /// `NewGlobalRef`
    fn new_global_ref(&self, env: EnvHandle, object: ObjectRef) -> Option<ObjectRef>;

    /// `DeleteGlobalRef`
    fn delete_global_ref(&self, env: EnvHandle, object: ObjectRef);

    /// `DeleteLocalRef`
    fn delete_local_ref(&self, env: EnvHandle, object: ObjectRef);

    /// `ExceptionOccurred`: the pending throwable as a new local reference
    fn exception_occurred(&self, env: EnvHandle) -> Option<ObjectRef>;

    /// `ExceptionDescribe`: prints the pending exception (and clears it)
    fn exception_describe(&self, env: EnvHandle);

    /// `ExceptionClear`
    fn exception_clear(&self, env: EnvHandle);

    /// `Throw`: make `throwable` the pending exception
    fn throw(&self, env: EnvHandle, throwable: ObjectRef) -> bool;

    /// Create the process VM, returning it with the creating thread's environment
    fn create_java_vm(&self, args: &VmInitArgs) -> BridgeResult<(VmHandle, EnvHandle)>;
}
