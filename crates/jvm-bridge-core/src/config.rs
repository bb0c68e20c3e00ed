//! Environment-driven configuration
//!
//! | Variable            | Effect                                        |
//! |---------------------|-----------------------------------------------|
//! | `JVM_BRIDGE_LOG`    | Initial diagnostics threshold (name or number) |
//! | `JVM_BRIDGE_LIBJVM` | Explicit JVM library for standalone mode      |
//! | `JAVA_HOME`         | JDK/JRE root searched for the JVM library     |

use crate::diagnostics::{self, Level};
use crate::error::{BridgeError, BridgeResult};
use crate::locator::JvmLocator;
use std::ffi::OsString;

/// Variable holding the initial log threshold
pub const LOG_VAR: &str = "JVM_BRIDGE_LOG";
/// Variable holding an explicit JVM library path
pub const LIBJVM_VAR: &str = "JVM_BRIDGE_LIBJVM";
/// Standard JDK root variable
pub const JAVA_HOME_VAR: &str = "JAVA_HOME";

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Initial diagnostics threshold
    pub log_level: Level,
    /// Where standalone mode looks for the JVM library
    pub locator: JvmLocator,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: Level::Info,
            locator: JvmLocator::default(),
        }
    }
}

impl BridgeConfig {
    /// Read the configuration from the process environment.
    ///
    /// An unparseable `JVM_BRIDGE_LOG` falls back to `Info` with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let log_level = match lookup(LOG_VAR) {
            Some(value) => match parse_level(&value) {
                Ok(level) => level,
                Err(e) => {
                    jvm_warn!("{}; using {}", e, Level::Info);
                    Level::Info
                }
            },
            None => Level::Info,
        };

        BridgeConfig {
            log_level,
            locator: JvmLocator::from_env_values(lookup(LIBJVM_VAR), lookup(JAVA_HOME_VAR)),
        }
    }

    /// Install the process-wide settings (currently the log threshold)
    pub fn apply(&self) {
        diagnostics::set_log_threshold(self.log_level);
    }
}

fn parse_level(value: &OsString) -> BridgeResult<Level> {
    let text = value
        .to_str()
        .ok_or_else(|| BridgeError::Config(format!("{} is not valid UTF-8", LOG_VAR)))?;
    text.parse::<Level>()
        .map_err(|e| BridgeError::Config(format!("{}: {}", LOG_VAR, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: FxHashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = BridgeConfig::from_lookup(lookup(&[]));
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("JVM_BRIDGE_LOG", "debug"),
            ("JVM_BRIDGE_LIBJVM", "/opt/jdk/lib/server/libjvm.so"),
            ("JAVA_HOME", "/opt/jdk"),
        ]));

        assert_eq!(config.log_level, Level::Debug);
        assert_eq!(
            config.locator.library,
            Some(PathBuf::from("/opt/jdk/lib/server/libjvm.so"))
        );
        assert_eq!(config.locator.java_home, Some(PathBuf::from("/opt/jdk")));
    }

    #[test]
    fn test_numeric_log_priority() {
        let config = BridgeConfig::from_lookup(lookup(&[("JVM_BRIDGE_LOG", "5")]));
        assert_eq!(config.log_level, Level::Warn);
    }

    #[test]
    fn test_unknown_log_level_falls_back_to_info() {
        let config = BridgeConfig::from_lookup(lookup(&[("JVM_BRIDGE_LOG", "chatty")]));
        assert_eq!(config.log_level, Level::Info);
    }
}
