//! Error types for ovpnctl

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum HelperError {
    /// Profile name empty, missing or outside the allowlist
    InvalidProfileName(String),
    /// Profile path escapes the base directory
    InvalidPath(String),
    /// Required request fields missing or empty
    MissingFields(Vec<&'static str>),
    /// Username or password not representable in the credentials file
    InvalidCredentials(String),
    /// Profile artifact already on disk
    ProfileExists(String),
    /// No configuration file for the profile
    ProfileNotFound(String),
    /// A different profile's unit is running
    AnotherVpnActive { requested: String, active: Vec<String> },
    /// Service manager command failed
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },
    /// External call or lock wait exceeded its bound
    Timeout(String),
    /// Request body is not a JSON object
    InvalidJson(String),
    /// Missing or unrecognized action
    UnknownAction(Option<String>),
    /// IO error
    Io(io::Error),
    /// Configuration error
    ConfigError(String),
}

impl HelperError {
    /// Stable code reported to callers in error responses
    pub fn code(&self) -> &'static str {
        match self {
            HelperError::InvalidProfileName(_) => "INVALID_PROFILE_NAME",
            HelperError::InvalidPath(_) => "INVALID_PATH",
            HelperError::MissingFields(_) => "MISSING_FIELDS",
            HelperError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            HelperError::ProfileExists(_) => "PROFILE_EXISTS",
            HelperError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            HelperError::AnotherVpnActive { .. } => "ANOTHER_VPN_ACTIVE",
            HelperError::CommandFailed { .. } => "SYSTEMCTL_FAILED",
            HelperError::Timeout(_) => "TIMEOUT",
            HelperError::InvalidJson(_) => "INVALID_JSON",
            HelperError::UnknownAction(_) => "UNKNOWN_ACTION",
            HelperError::Io(_) => "IO_ERROR",
            HelperError::ConfigError(_) => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for HelperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperError::InvalidProfileName(msg) => write!(f, "Invalid profile name: {}", msg),
            HelperError::InvalidPath(msg) => write!(f, "Invalid profile path: {}", msg),
            HelperError::MissingFields(fields) => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
            HelperError::InvalidCredentials(msg) => write!(f, "Invalid credentials: {}", msg),
            HelperError::ProfileExists(name) => write!(f, "VPN profile already exists: {}", name),
            HelperError::ProfileNotFound(name) => write!(f, "VPN profile not found: {}", name),
            HelperError::AnotherVpnActive { requested, active } => write!(
                f,
                "Another VPN is already active ({}); cannot connect {}",
                active.join(", "),
                requested
            ),
            HelperError::CommandFailed { cmd, code, .. } => {
                if let Some(code) = code {
                    write!(f, "System service operation failed: '{}' exited with code {}", cmd, code)
                } else {
                    write!(f, "System service operation failed: '{}'", cmd)
                }
            }
            HelperError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            HelperError::InvalidJson(msg) => write!(f, "Invalid JSON request: {}", msg),
            HelperError::UnknownAction(Some(action)) => write!(f, "Unknown action: {}", action),
            HelperError::UnknownAction(None) => write!(f, "Unknown action: no action given"),
            HelperError::Io(e) => write!(f, "IO error: {}", e),
            HelperError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for HelperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HelperError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HelperError {
    fn from(error: io::Error) -> Self {
        HelperError::Io(error)
    }
}

impl From<serde_json::Error> for HelperError {
    fn from(error: serde_json::Error) -> Self {
        HelperError::InvalidJson(error.to_string())
    }
}

pub type HelperResult<T> = Result<T, HelperError>;
