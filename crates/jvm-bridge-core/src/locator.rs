//! Locating the JVM shared library for standalone mode
//!
//! The library is loaded at runtime by [`JavaVM::with_libjvm`] rather than
//! linked, so one build runs against whatever JDK the host has. Search order:
//! an explicit path, then the standard layouts under `JAVA_HOME`. When
//! neither yields a file, [`JniRuntime`] falls back to automatic discovery.
//!
//! [`JavaVM::with_libjvm`]: jni::JavaVM::with_libjvm
//! [`JniRuntime`]: crate::sys::JniRuntime

use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while finding or loading the JVM library
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file missing or rejected by the dynamic loader
    #[error("Could not load JVM library {path}: {reason}")]
    NotFound {
        /// Path that was attempted
        path: String,
        /// Loader message
        reason: String,
    },

    /// No JVM library in any configured location
    #[error("No JVM library found (searched: {searched})")]
    NoCandidate {
        /// Locations that were tried
        searched: String,
    },

    /// Automatic discovery found no JVM either
    #[error("JVM discovery failed: {0}")]
    Discovery(String),
}

#[cfg(target_os = "windows")]
const JVM_LIBRARY: &str = "jvm.dll";
#[cfg(target_os = "macos")]
const JVM_LIBRARY: &str = "libjvm.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const JVM_LIBRARY: &str = "libjvm.so";

/// Locations under a JDK/JRE root that may hold the JVM library, newest
/// layout first.
#[cfg(target_os = "windows")]
const JAVA_HOME_DIRS: &[&str] = &["bin/server", "bin/client", "jre/bin/server", "jre/bin/client"];
#[cfg(not(target_os = "windows"))]
const JAVA_HOME_DIRS: &[&str] = &[
    "lib/server",
    "lib/client",
    "jre/lib/server",
    "jre/lib/amd64/server",
    "jre/lib/aarch64/server",
    "jre/lib/i386/client",
];

/// Finds the JVM shared library for standalone mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmLocator {
    /// Explicit library path; used as-is when set
    pub library: Option<PathBuf>,
    /// JDK/JRE root to search
    pub java_home: Option<PathBuf>,
}

impl JvmLocator {
    /// Locator with an explicit library path
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        JvmLocator {
            library: Some(path.into()),
            java_home: None,
        }
    }

    /// Locator searching a JDK/JRE root
    pub fn with_java_home(path: impl Into<PathBuf>) -> Self {
        JvmLocator {
            library: None,
            java_home: Some(path.into()),
        }
    }

    /// Every path this locator would try, in order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(library) = &self.library {
            candidates.push(library.clone());
        }
        if let Some(home) = &self.java_home {
            candidates.extend(JAVA_HOME_DIRS.iter().map(|dir| home.join(dir).join(JVM_LIBRARY)));
        }
        candidates
    }

    /// First candidate that exists on disk.
    ///
    /// An explicit library path is returned even if missing so that the
    /// load error names it.
    pub fn locate(&self) -> Result<PathBuf, LoadError> {
        if let Some(library) = &self.library {
            return Ok(library.clone());
        }
        let candidates = self.candidates();
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| LoadError::NoCandidate {
                searched: if candidates.is_empty() {
                    "no JAVA_HOME".to_string()
                } else {
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })
    }

    /// Locator from already-read environment values
    pub(crate) fn from_env_values(library: Option<OsString>, java_home: Option<OsString>) -> Self {
        JvmLocator {
            library: library.filter(|v| !v.is_empty()).map(PathBuf::from),
            java_home: java_home.filter(|v| !v.is_empty()).map(PathBuf::from),
        }
    }
}
