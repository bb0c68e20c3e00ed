//! C FFI bindings for the JVM bridge
//!
//! This module exposes the process-wide bridge to native hosts.
//! The API follows these principles:
//! - ABI-stable (uses only C-compatible types and raw JNI pointers)
//! - Failures are NULL/0 returns; details go to the diagnostics channel
//! - Nothing panics or unwinds across the boundary
//! - Exactly one bridge, and one VM, per process
//!
//! Two ways in:
//! - **Managed host**: the JVM loads this library (`JNI_OnLoad`) and the
//!   host's Java side calls `JvmBridge.initialize(context, classLoader)`
//! - **Standalone**: the native host calls `jvmbridge_spawn_vm()`

use jni::objects::{JClass, JObject};
use jni::sys::{self, jclass, jint, jobject, JavaVMInitArgs};
use jni::{JNIEnv, JavaVM};
use jvm_bridge_core::diagnostics;
use jvm_bridge_core::{
    jvm_debug, jvm_error, Bridge, BridgeConfig, BridgeError, EnvHandle, JniRuntime, ObjectRef,
    VmHandle, VmInitArgs,
};
use once_cell::sync::Lazy;
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::ptr;

/// JNI version reported from `JNI_OnLoad`
const ONLOAD_JNI_VERSION: jint = sys::JNI_VERSION_1_6;

/// Version reported by `jvmbridge_version`
const VERSION: &CStr = match CStr::from_bytes_with_nul(
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes(),
) {
    Ok(version) => version,
    Err(_) => panic!("package version contains NUL"),
};

/// The process-wide bridge, configured from the environment on first use
static BRIDGE: Lazy<Bridge<JniRuntime>> = Lazy::new(|| {
    let config = BridgeConfig::from_env();
    config.apply();
    Bridge::new(JniRuntime::from_config(&config))
});

// ============================================================================
// Helper Functions
// ============================================================================

fn object_or_null(object: Option<ObjectRef>) -> jobject {
    object.map_or(ptr::null_mut(), ObjectRef::as_raw)
}

fn env_or_null(result: Result<EnvHandle, BridgeError>, operation: &str) -> *mut sys::JNIEnv {
    match result {
        Ok(env) => env.as_raw(),
        Err(BridgeError::Uninitialized) => ptr::null_mut(),
        Err(e) => {
            jvm_error!("{}: {}", operation, e);
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Registry Queries
// ============================================================================

/// Get the Java VM of this process
///
/// # Returns
/// * The registered `JavaVM*`
/// * NULL if no VM has been registered or spawned
///
/// # Safety
/// Always safe to call.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_get_vm() -> *mut sys::JavaVM {
    BRIDGE.vm().map_or(ptr::null_mut(), VmHandle::as_raw)
}

/// Get the calling thread's JNI environment
///
/// Attaches the calling thread on first use; later calls from the same
/// thread return the same environment.
///
/// # Returns
/// * `JNIEnv*` valid on the calling thread only
/// * NULL if no VM is registered or the thread could not be attached
///
/// # Safety
/// The returned pointer must not be used from another thread.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_get_env() -> *mut sys::JNIEnv {
    env_or_null(BRIDGE.env(), "get_env")
}

/// Load a class by name
///
/// Uses the host classloader in managed-host mode and `FindClass`
/// otherwise. Both `java.lang.String` and `java/lang/String` are accepted.
///
/// # Arguments
/// * `name` - Null-terminated UTF-8 class name
///
/// # Returns
/// * Local reference to the class
/// * NULL on failure; a Java exception describing the failure stays pending
///
/// # Safety
/// `name` must be NULL or a valid null-terminated string.
///
/// # Example (C)
/// ```c
/// jclass cls = jvmbridge_load_class("java.util.ArrayList");
/// if (cls == NULL) {
///     JNIEnv *env = jvmbridge_get_env();
///     (*env)->ExceptionClear(env);
/// }
/// ```
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_load_class(name: *const c_char) -> jclass {
    if name.is_null() {
        return ptr::null_mut();
    }

    let name = match CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => {
            jvm_error!("load_class: class name is not valid UTF-8");
            return ptr::null_mut();
        }
    };

    match BRIDGE.load_class(name) {
        Ok(class) => class.as_raw(),
        Err(e) => {
            jvm_debug!("load_class({}): {}", name, e);
            ptr::null_mut()
        }
    }
}

/// Get the host application's classloader
///
/// # Returns
/// * Global reference owned by the bridge (do not delete it)
/// * NULL outside managed-host mode
///
/// # Safety
/// Always safe to call.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_get_class_loader() -> jobject {
    object_or_null(BRIDGE.class_loader())
}

/// Get the host application context
///
/// # Returns
/// * Global reference owned by the bridge (do not delete it)
/// * NULL outside managed-host mode
///
/// # Safety
/// Always safe to call.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_get_application_context() -> jobject {
    object_or_null(BRIDGE.embedding_context())
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Set the diagnostics threshold
///
/// # Arguments
/// * `level` - Android log priority: 2 verbose, 3 debug, 4 info, 5 warn,
///   6 error, 7 fatal. Messages below `level` are dropped.
///
/// # Safety
/// Always safe to call.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_set_log_level(level: c_int) {
    // Environment configuration must not overwrite an explicit level later.
    Lazy::force(&BRIDGE);
    diagnostics::set_log_priority(level);
}

// ============================================================================
// Standalone Mode
// ============================================================================

/// Create the process VM
///
/// # Arguments
/// * `args` - Initialization arguments, or NULL for the defaults
///   (`JNI_VERSION_1_2`, `-Djava.class.path=.`, ignore unrecognized options)
///
/// # Returns
/// * The calling thread's `JNIEnv*`
/// * NULL if the VM could not be created or one is already running
///
/// # Safety
/// `args` must be NULL or point to valid `JavaVMInitArgs`.
///
/// # Example (C)
/// ```c
/// JNIEnv *env = jvmbridge_spawn_vm(NULL);
/// if (env == NULL) {
///     return 1;
/// }
/// ```
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_spawn_vm(args: *const JavaVMInitArgs) -> *mut sys::JNIEnv {
    let args = args.as_ref().map(|raw| VmInitArgs::from_raw(raw));
    env_or_null(BRIDGE.spawn(args.as_ref()), "spawn_vm")
}

/// Create the process VM from JSON arguments
///
/// # Arguments
/// * `json` - Null-terminated JSON object such as
///   `{"version": 65544, "options": ["-Xmx256m"], "ignore_unrecognized": true}`;
///   missing fields take their defaults. NULL uses the defaults.
///
/// # Returns
/// * The calling thread's `JNIEnv*`
/// * NULL on invalid JSON or if the VM could not be created
///
/// # Safety
/// `json` must be NULL or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_spawn_vm_json(json: *const c_char) -> *mut sys::JNIEnv {
    if json.is_null() {
        return env_or_null(BRIDGE.spawn(None), "spawn_vm");
    }

    let parsed = CStr::from_ptr(json)
        .to_str()
        .map_err(|_| BridgeError::Config("init args are not valid UTF-8".to_string()))
        .and_then(VmInitArgs::from_json);

    match parsed {
        Ok(args) => env_or_null(BRIDGE.spawn(Some(&args)), "spawn_vm"),
        Err(e) => {
            jvm_error!("spawn_vm: {}", e);
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Thread Lifecycle
// ============================================================================

/// Detach the calling thread from the VM
///
/// Only threads attached by `jvmbridge_get_env` are detached. The thread that
/// spawned the VM and host threads running Java code are left alone. Local
/// references held by a detached thread become invalid.
///
/// # Returns
/// * 1 if the thread was detached
/// * 0 otherwise
///
/// # Safety
/// Must not be called from a thread that is executing Java code further up
/// its stack.
#[no_mangle]
pub unsafe extern "C" fn jvmbridge_detach_thread() -> c_int {
    c_int::from(BRIDGE.detach_current_thread())
}

// ============================================================================
// JNI Entry Points
// ============================================================================

/// Called by the JVM when it loads this library; registers the VM for
/// direct class lookup.
///
/// Called by the JVM with a valid `JavaVM*`.
#[no_mangle]
pub extern "system" fn JNI_OnLoad(vm: JavaVM, _reserved: *mut c_void) -> jint {
    if let Some(vm) = unsafe { VmHandle::from_raw(vm.get_java_vm_pointer()) } {
        if let Err(e) = BRIDGE.register_vm(vm) {
            jvm_error!("JNI_OnLoad: {}", e);
        }
    }
    ONLOAD_JNI_VERSION
}

/// Managed-host initialization callback.
///
/// Java side:
/// ```java
/// package dev.jvmbridge;
///
/// public final class JvmBridge {
///     static { System.loadLibrary("jvm_bridge_ffi"); }
///     public static native void initialize(Object context, ClassLoader classLoader);
/// }
/// ```
///
/// Called by the JVM on an attached thread with valid references.
#[no_mangle]
pub extern "system" fn Java_dev_jvmbridge_JvmBridge_initialize<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    context: JObject<'local>,
    class_loader: JObject<'local>,
) {
    let Some(env) = (unsafe { EnvHandle::from_raw(env.get_raw()) }) else {
        return;
    };
    let context = unsafe { ObjectRef::from_raw(context.as_raw()) };
    let class_loader = unsafe { ObjectRef::from_raw(class_loader.as_raw()) };

    if let Err(e) = BRIDGE.initialize_embedded(env, context, class_loader) {
        jvm_error!("initialize: {}", e);
    }
}

// ============================================================================
// Version Information
// ============================================================================

/// Version of this library as `major.minor.patch`
///
/// The string is static. Callers must not free it.
#[no_mangle]
pub extern "C" fn jvmbridge_version() -> *const c_char {
    VERSION.as_ptr()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    static LOG_LEVEL_LOCK: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_queries_before_initialization() {
        unsafe {
            assert!(jvmbridge_get_vm().is_null());
            assert!(jvmbridge_get_env().is_null());
            assert!(jvmbridge_get_class_loader().is_null());
            assert!(jvmbridge_get_application_context().is_null());
            assert_eq!(jvmbridge_detach_thread(), 0);

            let name = b"java/lang/String\0".as_ptr() as *const c_char;
            assert!(jvmbridge_load_class(name).is_null());
        }
    }

    #[test]
    fn test_load_class_rejects_bad_names() {
        unsafe {
            assert!(jvmbridge_load_class(ptr::null()).is_null());

            let invalid_utf8 = b"java/lang/\xff\0".as_ptr() as *const c_char;
            assert!(jvmbridge_load_class(invalid_utf8).is_null());
        }
    }

    #[test]
    fn test_spawn_rejects_invalid_json() {
        unsafe {
            let json = b"{\"options\": \"-Xmx1g\"}\0".as_ptr() as *const c_char;
            assert!(jvmbridge_spawn_vm_json(json).is_null());

            let not_json = b"-Xmx1g\0".as_ptr() as *const c_char;
            assert!(jvmbridge_spawn_vm_json(not_json).is_null());

            assert!(jvmbridge_get_vm().is_null());
        }
    }

    #[test]
    fn test_set_log_level() {
        let _guard = LOG_LEVEL_LOCK.lock();
        unsafe {
            let saved = diagnostics::log_threshold();

            jvmbridge_set_log_level(5);
            assert_eq!(diagnostics::log_threshold(), 5);
            assert!(!diagnostics::enabled(diagnostics::Level::Debug));
            assert!(diagnostics::enabled(diagnostics::Level::Warn));

            jvmbridge_set_log_level(saved);
        }
    }

    #[test]
    fn test_version_matches_package() {
        let version = unsafe { CStr::from_ptr(jvmbridge_version()) };
        let parts: Vec<&str> = version.to_str().unwrap().split('.').collect();

        assert_eq!(
            parts,
            [
                env!("CARGO_PKG_VERSION_MAJOR"),
                env!("CARGO_PKG_VERSION_MINOR"),
                env!("CARGO_PKG_VERSION_PATCH"),
            ]
        );
    }

    #[test]
    fn test_version_is_stable_across_calls() {
        assert_eq!(jvmbridge_version(), jvmbridge_version());
    }
}
