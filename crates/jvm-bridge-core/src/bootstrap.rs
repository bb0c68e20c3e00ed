//! Standalone VM creation
//!
//! When no host owns a VM, [`Bridge::spawn`] creates one. The JNI invocation
//! API allows a single VM per process, so spawning again is refused and the
//! registered VM is left untouched.

use crate::bridge::Bridge;
use crate::env;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::EnvHandle;
use crate::runtime::JavaRuntime;
use jni::sys::{JavaVMInitArgs, JNI_FALSE};
use serde::Deserialize;
use std::ffi::CStr;

/// Classpath used when no arguments are given
pub const DEFAULT_CLASS_PATH: &str = ".";

/// VM initialization arguments
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmInitArgs {
    /// Requested JNI version (`JNI_VERSION_*`)
    pub version: i32,
    /// Option strings, in order (`-Djava.class.path=...`, `-Xmx256m`, ...)
    pub options: Vec<String>,
    /// Ignore options the VM does not recognize
    pub ignore_unrecognized: bool,
}

impl Default for VmInitArgs {
    fn default() -> Self {
        Self {
            version: jni::sys::JNI_VERSION_1_2,
            options: vec![format!("-Djava.class.path={}", DEFAULT_CLASS_PATH)],
            ignore_unrecognized: true,
        }
    }
}

impl VmInitArgs {
    /// Empty argument list for `version`
    pub fn new(version: i32) -> Self {
        Self {
            version,
            options: Vec::new(),
            ignore_unrecognized: false,
        }
    }

    /// Append an option string
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Append a `-Djava.class.path=` option
    pub fn class_path(self, path: impl AsRef<str>) -> Self {
        self.option(format!("-Djava.class.path={}", path.as_ref()))
    }

    /// Set the "ignore unrecognized options" flag
    pub fn ignore_unrecognized(mut self, ignore: bool) -> Self {
        self.ignore_unrecognized = ignore;
        self
    }

    /// Parse arguments from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::Config(format!("init args: {}", e)))
    }

    /// Copy a C `JavaVMInitArgs`.
    ///
    /// Options that are not valid UTF-8 are converted lossily. `extraInfo`
    /// hooks are not carried over.
    ///
    /// # Safety
    /// `raw.options` must point to `raw.nOptions` valid options whose
    /// `optionString` is NULL or NUL-terminated.
    pub unsafe fn from_raw(raw: &JavaVMInitArgs) -> Self {
        let count = usize::try_from(raw.nOptions).unwrap_or(0);
        let options = if count == 0 || raw.options.is_null() {
            Vec::new()
        } else {
            std::slice::from_raw_parts(raw.options, count)
                .iter()
                .filter(|opt| !opt.optionString.is_null())
                .map(|opt| CStr::from_ptr(opt.optionString).to_string_lossy().into_owned())
                .collect()
        };

        Self {
            version: raw.version,
            options,
            ignore_unrecognized: raw.ignoreUnrecognized != JNI_FALSE,
        }
    }
}

impl<R: JavaRuntime> Bridge<R> {
    /// Create the process VM (standalone mode).
    ///
    /// `None` uses [`VmInitArgs::default`]. On success the VM is registered
    /// and the calling thread's environment is returned and cached. Fails
    /// with [`BridgeError::AlreadyRunning`] without calling into the runtime
    /// when a VM is already registered.
    pub fn spawn(&self, args: Option<&VmInitArgs>) -> BridgeResult<EnvHandle> {
        if self.vm().is_some() {
            jvm_warn!("A Java VM is already running; not spawning another");
            return Err(BridgeError::AlreadyRunning);
        }

        let defaults;
        let args = match args {
            Some(args) => args,
            None => {
                defaults = VmInitArgs::default();
                &defaults
            }
        };
        jvm_debug!("JNI Version: {:#x}", args.version);

        let (vm, env) = self.runtime().create_java_vm(args).map_err(|e| {
            jvm_error!("Could not create Java VM: {}", e);
            e
        })?;

        if !self.registry().store_vm(vm) {
            jvm_error!("Another Java VM was registered while spawning");
            return Err(BridgeError::AlreadyRunning);
        }
        env::seed(self.id(), env);
        jvm_info!("Spawned Java VM with {} option(s)", args.options.len());
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use jni::sys::JavaVMOption;
    use std::ffi::CString;

    #[test]
    fn test_default_args() {
        let args = VmInitArgs::default();
        assert_eq!(args.version, jni::sys::JNI_VERSION_1_2);
        assert_eq!(args.options, vec!["-Djava.class.path=.".to_string()]);
        assert!(args.ignore_unrecognized);
    }

    #[test]
    fn test_builder() {
        let args = VmInitArgs::new(jni::sys::JNI_VERSION_1_8)
            .class_path("app.jar")
            .option("-Xmx256m")
            .ignore_unrecognized(true);

        assert_eq!(args.version, jni::sys::JNI_VERSION_1_8);
        assert_eq!(args.options, vec!["-Djava.class.path=app.jar", "-Xmx256m"]);
        assert!(args.ignore_unrecognized);
    }

    #[test]
    fn test_json_args() {
        let args = VmInitArgs::from_json(r#"{"version": 65544, "options": ["-Xss1m"]}"#).unwrap();
        assert_eq!(args.version, jni::sys::JNI_VERSION_1_8);
        assert_eq!(args.options, vec!["-Xss1m"]);
        assert!(args.ignore_unrecognized);

        let empty = VmInitArgs::from_json("{}").unwrap();
        assert_eq!(empty, VmInitArgs::default());

        assert!(matches!(
            VmInitArgs::from_json("{\"options\": 3}"),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_from_raw_args() {
        let strings = [
            CString::new("-Djava.class.path=lib").unwrap(),
            CString::new("-verbose:jni").unwrap(),
        ];
        let mut options: Vec<JavaVMOption> = strings
            .iter()
            .map(|s| JavaVMOption {
                optionString: s.as_ptr() as *mut _,
                extraInfo: std::ptr::null_mut(),
            })
            .collect();
        let raw = JavaVMInitArgs {
            version: jni::sys::JNI_VERSION_1_6,
            nOptions: options.len() as i32,
            options: options.as_mut_ptr(),
            ignoreUnrecognized: jni::sys::JNI_FALSE,
        };

        let args = unsafe { VmInitArgs::from_raw(&raw) };
        assert_eq!(args.version, jni::sys::JNI_VERSION_1_6);
        assert_eq!(args.options, vec!["-Djava.class.path=lib", "-verbose:jni"]);
        assert!(!args.ignore_unrecognized);
    }

    #[test]
    fn test_spawn_registers_vm() {
        let bridge = Bridge::new(FakeRuntime::new());
        assert!(bridge.vm().is_none());

        let env = bridge.spawn(None).unwrap();
        assert_eq!(bridge.vm(), Some(bridge.runtime().vm()));
        assert_eq!(bridge.runtime().last_init_args(), Some(VmInitArgs::default()));

        // The creating thread reuses its environment without attaching.
        assert_eq!(bridge.env().unwrap(), env);
        assert_eq!(bridge.runtime().attach_count(), 0);
    }

    #[test]
    fn test_second_spawn_keeps_vm() {
        let bridge = Bridge::new(FakeRuntime::new());
        bridge.spawn(None).unwrap();
        let vm = bridge.vm();

        assert!(matches!(
            bridge.spawn(Some(&VmInitArgs::new(jni::sys::JNI_VERSION_1_8))),
            Err(BridgeError::AlreadyRunning)
        ));
        assert_eq!(bridge.vm(), vm);
        assert_eq!(bridge.runtime().create_calls(), 1);
    }

    #[test]
    fn test_spawn_failure_leaves_registry_empty() {
        let bridge = Bridge::new(FakeRuntime::new());
        bridge.runtime().fail_create_with(jni::sys::JNI_ERR);

        assert!(matches!(
            bridge.spawn(None),
            Err(BridgeError::VmCreation(jni::sys::JNI_ERR))
        ));
        assert!(bridge.vm().is_none());
        assert!(matches!(bridge.env(), Err(BridgeError::Uninitialized)));
    }
}
