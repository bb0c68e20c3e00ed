//! [`JavaRuntime`] over the `jni` crate
//!
//! The bridge passes raw handles around because the C API hands them to
//! native callers. Each call wraps them back into `jni` types for the
//! duration of one operation. Global references created here stay owned by
//! the runtime as [`GlobalRef`]s until the bridge deletes them.

use crate::bootstrap::VmInitArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ClassRef, EnvHandle, MethodId, ObjectRef, VmHandle};
use crate::locator::JvmLocator;
use crate::runtime::JavaRuntime;
use jni::errors::{Error, JniError};
use jni::objects::{GlobalRef, JClass, JMethodID, JObject, JThrowable};
use jni::signature::ReturnType;
use jni::sys::{self, jint, jvalue};
use jni::{JNIEnv, JavaVM};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ffi::CStr;

/// Real JNI runtime.
///
/// Standalone mode loads the JVM library on the first `spawn`; it then stays
/// loaded for the life of the process.
#[derive(Debug, Default)]
pub struct JniRuntime {
    locator: JvmLocator,
    globals: Mutex<FxHashMap<usize, GlobalRef>>,
}

impl JniRuntime {
    /// Runtime searching for the JVM library with `locator`
    pub fn new(locator: JvmLocator) -> Self {
        JniRuntime {
            locator,
            globals: Mutex::new(FxHashMap::default()),
        }
    }

    /// Runtime configured from a [`BridgeConfig`]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.locator.clone())
    }

    #[cfg(target_os = "android")]
    fn create(&self, _args: &VmInitArgs) -> BridgeResult<(VmHandle, EnvHandle)> {
        Err(BridgeError::Unsupported(
            "JNI_CreateJavaVM; the app process already owns a VM",
        ))
    }

    #[cfg(not(target_os = "android"))]
    fn create(&self, args: &VmInitArgs) -> BridgeResult<(VmHandle, EnvHandle)> {
        use crate::locator::LoadError;
        use jni::errors::StartJvmError;
        use jni::{InitArgsBuilder, JNIVersion};

        let mut builder = InitArgsBuilder::new()
            .version(JNIVersion::from(args.version))
            .ignore_unrecognized(args.ignore_unrecognized);
        for option in &args.options {
            builder = builder.option(option.as_str());
        }
        let init_args = builder
            .build()
            .map_err(|e| BridgeError::Config(format!("invalid VM option: {}", e)))?;

        let created = match self.locator.locate() {
            Ok(path) => {
                jvm_debug!("Loading JVM library from {}", path.display());
                JavaVM::with_libjvm(init_args, || Ok(path))
            }
            Err(LoadError::NoCandidate { searched }) => {
                jvm_debug!("No configured JVM library ({}); trying discovery", searched);
                JavaVM::new(init_args)
            }
            Err(e) => return Err(e.into()),
        };

        let vm = created.map_err(|e| match e {
            StartJvmError::NotFound(e) => LoadError::Discovery(e.to_string()).into(),
            StartJvmError::LoadError(path, e) => LoadError::NotFound {
                path,
                reason: e.to_string(),
            }
            .into(),
            StartJvmError::Create(e) => BridgeError::VmCreation(error_code(&e)),
            _ => BridgeError::VmCreation(sys::JNI_ERR),
        })?;

        // The creating thread comes back detached; attach it like any other.
        let env = vm
            .attach_current_thread_permanently()
            .map_err(|e| BridgeError::AttachFailed(error_code(&e)))?;
        let env =
            unsafe { EnvHandle::from_raw(env.get_raw()) }.ok_or(BridgeError::Jni("GetEnv"))?;
        let vm = unsafe { VmHandle::from_raw(vm.get_java_vm_pointer()) }
            .ok_or(BridgeError::Jni("JNI_CreateJavaVM"))?;
        Ok((vm, env))
    }
}

/// JNI status code behind a `jni` error
fn error_code(error: &Error) -> jint {
    match error {
        Error::JniCall(JniError::ThreadDetached) => sys::JNI_EDETACHED,
        Error::JniCall(JniError::WrongVersion) => sys::JNI_EVERSION,
        Error::JniCall(JniError::NoMemory) => sys::JNI_ENOMEM,
        Error::JniCall(JniError::AlreadyCreated) => sys::JNI_EEXIST,
        Error::JniCall(JniError::InvalidArguments) => sys::JNI_EINVAL,
        Error::JniCall(JniError::Other(code)) => *code,
        _ => sys::JNI_ERR,
    }
}

fn env<'local>(handle: EnvHandle) -> Option<JNIEnv<'local>> {
    unsafe { JNIEnv::from_raw(handle.as_raw()) }.ok()
}

fn vm(handle: VmHandle) -> Option<JavaVM> {
    unsafe { JavaVM::from_raw(handle.as_raw()) }.ok()
}

fn object<'local>(handle: ObjectRef) -> JObject<'local> {
    unsafe { JObject::from_raw(handle.as_raw()) }
}

fn class<'local>(handle: ClassRef) -> JClass<'local> {
    unsafe { JClass::from_raw(handle.as_raw()) }
}

fn object_ref(object: JObject<'_>) -> Option<ObjectRef> {
    unsafe { ObjectRef::from_raw(object.into_raw()) }
}

impl JavaRuntime for JniRuntime {
    fn attach_current_thread(&self, handle: VmHandle) -> Result<EnvHandle, i32> {
        let vm = vm(handle).ok_or(sys::JNI_ERR)?;
        let env = vm
            .attach_current_thread_permanently()
            .map_err(|e| error_code(&e))?;
        unsafe { EnvHandle::from_raw(env.get_raw()) }.ok_or(sys::JNI_ERR)
    }

    fn detach_current_thread(&self, handle: VmHandle) -> Result<(), i32> {
        let vm = vm(handle).ok_or(sys::JNI_ERR)?;
        // Only releases an attachment made through `attach_current_thread`.
        unsafe { vm.detach_current_thread() };
        Ok(())
    }

    fn java_vm(&self, handle: EnvHandle) -> Option<VmHandle> {
        let vm = env(handle)?.get_java_vm().ok()?;
        unsafe { VmHandle::from_raw(vm.get_java_vm_pointer()) }
    }

    fn find_class(&self, handle: EnvHandle, name: &CStr) -> Option<ClassRef> {
        let mut env = env(handle)?;
        let class = env.find_class(name.to_str().ok()?).ok()?;
        object_ref(class.into())
    }

    fn new_string_utf(&self, handle: EnvHandle, value: &CStr) -> Option<ObjectRef> {
        let env = env(handle)?;
        let string = env.new_string(value.to_str().ok()?).ok()?;
        object_ref(string.into())
    }

    fn call_object_method(
        &self,
        handle: EnvHandle,
        target: ObjectRef,
        method: MethodId,
        args: &[ObjectRef],
    ) -> Option<ObjectRef> {
        let mut env = env(handle)?;
        let args: Vec<jvalue> = args.iter().map(|arg| jvalue { l: arg.as_raw() }).collect();
        let method = unsafe { JMethodID::from_raw(method.as_raw()) };
        let result =
            unsafe { env.call_method_unchecked(object(target), method, ReturnType::Object, &args) };
        object_ref(result.ok()?.l().ok()?)
    }

    fn object_class(&self, handle: EnvHandle, target: ObjectRef) -> Option<ClassRef> {
        let class = env(handle)?.get_object_class(object(target)).ok()?;
        object_ref(class.into())
    }

    fn method_id(
        &self,
        handle: EnvHandle,
        owner: ClassRef,
        name: &CStr,
        sig: &CStr,
    ) -> Option<MethodId> {
        let mut env = env(handle)?;
        let id = env
            .get_method_id(&class(owner), name.to_str().ok()?, sig.to_str().ok()?)
            .ok()?;
        unsafe { MethodId::from_raw(id.into_raw()) }
    }

    fn static_method_id(
        &self,
        handle: EnvHandle,
        owner: ClassRef,
        name: &CStr,
        sig: &CStr,
    ) -> Option<MethodId> {
        let mut env = env(handle)?;
        let id = env
            .get_static_method_id(&class(owner), name.to_str().ok()?, sig.to_str().ok()?)
            .ok()?;
        unsafe { MethodId::from_raw(id.into_raw()) }
    }

    fn new_global_ref(&self, handle: EnvHandle, target: ObjectRef) -> Option<ObjectRef> {
        let global = env(handle)?.new_global_ref(object(target)).ok()?;
        let raw = unsafe { ObjectRef::from_raw(global.as_obj().as_raw()) }?;
        self.globals.lock().insert(raw.as_raw() as usize, global);
        Some(raw)
    }

    fn delete_global_ref(&self, _handle: EnvHandle, target: ObjectRef) {
        let released = self.globals.lock().remove(&(target.as_raw() as usize));
        drop(released);
    }

    fn delete_local_ref(&self, handle: EnvHandle, target: ObjectRef) {
        if let Some(env) = env(handle) {
            let _ = env.delete_local_ref(object(target));
        }
    }

    fn exception_occurred(&self, handle: EnvHandle) -> Option<ObjectRef> {
        let throwable = env(handle)?.exception_occurred().ok()?;
        object_ref(throwable.into())
    }

    fn exception_describe(&self, handle: EnvHandle) {
        if let Some(env) = env(handle) {
            let _ = env.exception_describe();
        }
    }

    fn exception_clear(&self, handle: EnvHandle) {
        if let Some(env) = env(handle) {
            let _ = env.exception_clear();
        }
    }

    fn throw(&self, handle: EnvHandle, throwable: ObjectRef) -> bool {
        let Some(mut env) = env(handle) else {
            return false;
        };
        let throwable = unsafe { JThrowable::from_raw(throwable.as_raw()) };
        env.throw(&throwable).is_ok()
    }

    fn create_java_vm(&self, args: &VmInitArgs) -> BridgeResult<(VmHandle, EnvHandle)> {
        self.create(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LoadError;

    #[cfg(not(target_os = "android"))]
    #[test]
    fn test_missing_library_is_reported() {
        let runtime = JniRuntime::new(JvmLocator::with_library("/nonexistent/libjvm.so"));

        match runtime.create_java_vm(&VmInitArgs::default()) {
            Err(BridgeError::Library(LoadError::NotFound { path, .. })) => {
                assert!(path.contains("/nonexistent/libjvm.so"));
            }
            other => panic!("Expected a library error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn test_option_with_nul_is_rejected() {
        let runtime = JniRuntime::new(JvmLocator::with_library("/nonexistent/libjvm.so"));
        let args = VmInitArgs::default().option("-Dbad=\0value");

        assert!(matches!(
            runtime.create_java_vm(&args),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_error_codes_follow_jni_constants() {
        assert_eq!(
            error_code(&Error::JniCall(JniError::ThreadDetached)),
            sys::JNI_EDETACHED
        );
        assert_eq!(error_code(&Error::JniCall(JniError::NoMemory)), sys::JNI_ENOMEM);
        assert_eq!(error_code(&Error::JniCall(JniError::Other(-42))), -42);
        assert_eq!(error_code(&Error::JavaException), sys::JNI_ERR);
    }

    #[test]
    fn test_from_config_uses_locator() {
        let config = BridgeConfig {
            locator: JvmLocator::with_java_home("/opt/jdk"),
            ..BridgeConfig::default()
        };
        let runtime = JniRuntime::from_config(&config);
        assert_eq!(runtime.locator, config.locator);
    }
}
