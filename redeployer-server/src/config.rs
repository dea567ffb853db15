//! Service configuration
//!
//! Loaded once at startup from a YAML file and validated completely before
//! the server binds: the key policy is parsed, the salt and scrypt parameters
//! are checked, and every target pattern is compiled. Any failure here is
//! fatal; the service never starts in a degraded state.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use redeployer_core::{Authenticator, KeyError, ScryptKey, Target, TargetSet};
use serde::Deserialize;
use thiserror::Error;

use crate::container::DEFAULT_COMMAND_TIMEOUT;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/redeployer/config.yaml";

/// Default container runtime binary
pub const DEFAULT_RUNTIME: &str = "docker";

/// Errors that can occur when loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid authentication key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Invalid regex [{pattern}] for target {target}: {reason}")]
    InvalidPattern {
        target: String,
        pattern: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Raw file layout
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    authentication: RawAuthKey,

    #[serde(default = "default_runtime")]
    runtime: String,

    /// Seconds before a runtime or deploy command is killed
    #[serde(default = "default_command_timeout_secs")]
    command_timeout_secs: u64,

    #[serde(default)]
    services: HashMap<String, RawTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAuthKey {
    key: String,
    salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    binary: String,
    script: String,
    #[serde(alias = "mustMatch")]
    must_match: String,
}

fn default_runtime() -> String {
    DEFAULT_RUNTIME.to_string()
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

/// Validated, immutable service configuration
///
/// Shared read-only by every request for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Verifies deploy tokens
    pub authenticator: Authenticator,

    /// Deployable targets keyed by identifier
    pub targets: TargetSet,

    /// Container runtime binary (docker, podman or a path)
    pub runtime: String,

    /// Limit on each runtime or deploy command
    pub command_timeout: Duration,
}

impl ServiceConfig {
    /// Reads and validates the configuration file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&raw)
    }

    /// Parses and validates configuration from a YAML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let key = ScryptKey::parse(raw.authentication.key.trim())?
            .with_salt(raw.authentication.salt.trim());
        key.validate()?;

        if raw.runtime.trim().is_empty() {
            return Err(ConfigError::Invalid("runtime cannot be empty".to_string()));
        }

        if raw.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "command_timeout_secs must be positive".to_string(),
            ));
        }

        let mut targets = TargetSet::new();
        for (id, target) in raw.services {
            if id.is_empty() {
                return Err(ConfigError::Invalid("target id cannot be empty".to_string()));
            }
            if target.binary.is_empty() || target.script.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target {id} needs both binary and script"
                )));
            }

            let compiled = Target::new(&id, target.binary, target.script, &target.must_match)
                .map_err(|e| ConfigError::InvalidPattern {
                    target: id.clone(),
                    pattern: target.must_match.clone(),
                    reason: e.to_string(),
                })?;
            targets.insert(compiled);
        }

        Ok(Self {
            authenticator: Authenticator::new(key),
            targets,
            runtime: raw.runtime,
            command_timeout: Duration::from_secs(raw.command_timeout_secs),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_CONFIG: &str = r#"
authentication:
  key: "alg=scrypt$N=16384$r=8$p=1$keyLen=32$hash=b8059f5d26826ef3af0faa424a8fc0f51f80bd62aa46ada056f7174e08a69739"
  salt: "478c1d403dec20707cf487f81c06d646"
services:
  test-svc:
    binary: /bin/sh
    script: ./resources/test-svc.sh
    must_match: "^repository/svc:.*"
"#;

    #[test]
    fn test_parse_valid_config() {
        let config = ServiceConfig::parse(TEST_CONFIG).unwrap();

        assert_eq!(config.runtime, "docker");
        assert_eq!(config.targets.len(), 1);

        let target = config.targets.get("test-svc").unwrap();
        assert_eq!(target.binary, "/bin/sh");
        assert_eq!(target.script, "./resources/test-svc.sh");
        assert_eq!(target.must_match(), "^repository/svc:.*");
        assert_eq!(
            config.authenticator.key().salt(),
            "478c1d403dec20707cf487f81c06d646"
        );
    }

    #[test]
    fn test_accepts_camel_case_pattern_key() {
        let content = TEST_CONFIG.replace("must_match", "mustMatch");
        assert!(ServiceConfig::parse(&content).is_ok());
    }

    #[test]
    fn test_command_timeout() {
        let config = ServiceConfig::parse(TEST_CONFIG).unwrap();
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);

        let content = format!("command_timeout_secs: 30\n{TEST_CONFIG}");
        let config = ServiceConfig::parse(&content).unwrap();
        assert_eq!(config.command_timeout, Duration::from_secs(30));

        let content = format!("command_timeout_secs: 0\n{TEST_CONFIG}");
        assert!(matches!(
            ServiceConfig::parse(&content),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_oversized_key_cost_is_fatal() {
        let content = TEST_CONFIG.replace("N=16384", "N=1099511627776");
        assert!(matches!(
            ServiceConfig::parse(&content),
            Err(ConfigError::InvalidKey(KeyError::Derivation(_)))
        ));
    }

    #[test]
    fn test_invalid_key_is_fatal() {
        let content = TEST_CONFIG.replace("alg=scrypt", "alg=pbkdf2");
        assert!(matches!(
            ServiceConfig::parse(&content),
            Err(ConfigError::InvalidKey(KeyError::InvalidKey))
        ));
    }

    #[test]
    fn test_invalid_salt_is_fatal() {
        let content = TEST_CONFIG.replace("478c1d403dec20707cf487f81c06d646", "not-hex");
        assert!(matches!(
            ServiceConfig::parse(&content),
            Err(ConfigError::InvalidKey(KeyError::InvalidSalt(_)))
        ));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let content = TEST_CONFIG.replace("^repository/svc:.*", "^repository/(svc");
        match ServiceConfig::parse(&content) {
            Err(ConfigError::InvalidPattern { target, .. }) => assert_eq!(target, "test-svc"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_script_is_rejected() {
        let content = TEST_CONFIG.replace("./resources/test-svc.sh", "\"\"");
        assert!(matches!(
            ServiceConfig::parse(&content),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_custom_runtime() {
        let content = format!("runtime: podman\n{TEST_CONFIG}");
        assert_eq!(ServiceConfig::parse(&content).unwrap().runtime, "podman");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, TEST_CONFIG).unwrap();

        assert!(ServiceConfig::load(&path).is_ok());
        assert!(matches!(
            ServiceConfig::load(dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
