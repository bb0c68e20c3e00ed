//! Bridge errors

use crate::locator::LoadError;

/// Errors reported by bridge operations.
///
/// None of these unwind across the C ABI: the exported functions turn every
/// error into a null return plus a diagnostic line.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No VM has been registered yet
    #[error("No Java VM is registered")]
    Uninitialized,

    /// The VM refused to attach the calling thread
    #[error("AttachCurrentThread failed with code {0}")]
    AttachFailed(i32),

    /// Class name is empty or contains a NUL byte
    #[error("Invalid class name: {0:?}")]
    InvalidClassName(String),

    /// Class lookup failed; the Java exception is left pending
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Method lookup failed; the Java exception is left pending
    #[error("Method not found: {name}{signature}")]
    MethodNotFound {
        /// Method name
        name: String,
        /// JNI type signature
        signature: String,
    },

    /// `JNI_CreateJavaVM` returned an error code
    #[error("JNI_CreateJavaVM failed with code {0}")]
    VmCreation(i32),

    /// A different VM is already registered for this process
    #[error("A Java VM is already running in this process")]
    AlreadyRunning,

    /// Operation not available on this platform
    #[error("Unsupported on this platform: {0}")]
    Unsupported(&'static str),

    /// The JVM shared library could not be found or loaded
    #[error(transparent)]
    Library(#[from] LoadError),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JNI call failed
    #[error("JNI call failed: {0}")]
    Jni(&'static str),
}

/// Bridge operation result
pub type BridgeResult<T> = Result<T, BridgeError>;
