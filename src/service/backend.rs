use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::HelperResult;
use crate::validation::ProfileName;

/// Run-state of a profile's unit as reported by the service manager
/// (`active`, `inactive`, `failed`, `activating`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitState(String);

impl UnitState {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(state: &str) -> Self {
        let state = state.trim();
        if state.is_empty() {
            Self(Self::UNKNOWN.to_string())
        } else {
            Self(state.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_active(&self) -> bool {
        self.0 == "active"
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the helper needs from the host service manager
///
/// Every call blocks the request until the underlying operation finishes.
/// Any failure is fatal to the current request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Pick up newly written unit instances
    async fn reload(&self) -> HelperResult<()>;

    /// Mark a profile's unit as managed (install time only)
    async fn enable(&self, name: &ProfileName) -> HelperResult<()>;

    /// Activate a profile's unit
    async fn start(&self, name: &ProfileName) -> HelperResult<()>;

    /// Deactivate a profile's unit
    async fn stop(&self, name: &ProfileName) -> HelperResult<()>;

    /// Names of profiles whose unit is currently active
    async fn active_profiles(&self) -> HelperResult<BTreeSet<String>>;

    /// Run-state of one profile's unit. Units that were never installed
    /// report a state rather than an error.
    async fn is_active(&self, name: &ProfileName) -> HelperResult<UnitState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_state() {
        assert!(UnitState::new("active\n").is_active());
        assert!(!UnitState::new("inactive").is_active());
        assert!(!UnitState::new("activating").is_active());
        assert_eq!(UnitState::new("  ").as_str(), "unknown");
        assert_eq!(UnitState::new("failed").to_string(), "failed");
    }
}
