//! Configuration for the privileged helper
//!
//! The helper reads its configuration from a fixed location only. Arguments
//! and environment come from the unprivileged caller and must not be able to
//! point the helper at a different profile directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{HelperError, HelperResult};
use crate::sanitizer::DirectivePolicy;

/// Fixed configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ovpnctl/helper.toml";

/// Helper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelperConfig {
    /// Directory holding `<name>.conf` and `<name>.auth`
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Template unit prefix; units are `<prefix>@<name>.service`
    #[serde(default = "default_unit_prefix")]
    pub unit_prefix: String,
    /// Service manager executable
    #[serde(default = "default_systemctl")]
    pub systemctl: PathBuf,
    /// Lock file serializing connect requests
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    /// Bound on each service manager call and on the connect lock wait (seconds)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Additional forbidden directive prefixes
    #[serde(default)]
    pub extra_forbidden_prefixes: Vec<String>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/etc/openvpn")
}

fn default_unit_prefix() -> String {
    "openvpn".to_string()
}

fn default_systemctl() -> PathBuf {
    PathBuf::from("systemctl")
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/run/ovpnctl/connect.lock")
}

fn default_command_timeout_secs() -> u64 {
    60
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            unit_prefix: default_unit_prefix(),
            systemctl: default_systemctl(),
            lock_path: default_lock_path(),
            command_timeout_secs: default_command_timeout_secs(),
            extra_forbidden_prefixes: Vec::new(),
        }
    }
}

impl HelperConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> HelperResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HelperError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load configuration from file, falling back to defaults when absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> HelperResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate TOML configuration text
    pub fn parse(content: &str) -> HelperResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HelperError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HelperResult<()> {
        if !self.base_dir.is_absolute() {
            return Err(HelperError::ConfigError(
                "base_dir must be an absolute path".to_string(),
            ));
        }

        if !self.lock_path.is_absolute() {
            return Err(HelperError::ConfigError(
                "lock_path must be an absolute path".to_string(),
            ));
        }

        if self.unit_prefix.is_empty()
            || !self.unit_prefix.chars().all(crate::validation::is_allowed_name_char)
        {
            return Err(HelperError::ConfigError(format!(
                "Invalid unit_prefix '{}'",
                self.unit_prefix
            )));
        }

        if self.command_timeout_secs == 0 {
            return Err(HelperError::ConfigError(
                "command_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Directive policy with any configured extra prefixes
    pub fn directive_policy(&self) -> DirectivePolicy {
        DirectivePolicy::with_extra_prefixes(self.extra_forbidden_prefixes.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HelperConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("/etc/openvpn"));
        assert_eq!(config.unit_prefix, "openvpn");
        assert_eq!(config.command_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = HelperConfig::parse(
            "base_dir = \"/etc/openvpn/client\"\nunit_prefix = \"openvpn-client\"\n",
        )
        .unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/etc/openvpn/client"));
        assert_eq!(config.unit_prefix, "openvpn-client");
        assert_eq!(config.lock_path, PathBuf::from("/run/ovpnctl/connect.lock"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(HelperConfig::parse("base_dir = \"relative\"\n").is_err());
        assert!(HelperConfig::parse("unit_prefix = \"open vpn\"\n").is_err());
        assert!(HelperConfig::parse("command_timeout_secs = 0\n").is_err());
        assert!(HelperConfig::parse("unknown_key = 1\n").is_err());
    }

    #[test]
    fn test_extra_prefixes_extend_policy() {
        let config = HelperConfig::parse("extra_forbidden_prefixes = [\"route-up \"]\n").unwrap();
        assert_eq!(config.directive_policy().sanitize("route-up /x\nclient\n"), "client\n");
    }

    #[test]
    fn test_load_or_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("helper.toml");
        assert_eq!(HelperConfig::load_or_default(&path).unwrap(), HelperConfig::default());

        std::fs::write(&path, "command_timeout_secs = 5\n").unwrap();
        assert_eq!(HelperConfig::load_or_default(&path).unwrap().command_timeout_secs, 5);

        std::fs::write(&path, "command_timeout_secs = \"five\"\n").unwrap();
        assert_eq!(HelperConfig::load_or_default(&path).unwrap_err().code(), "INTERNAL_ERROR");
    }
}
