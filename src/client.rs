//! Unprivileged client for the helper
//!
//! Spawns the helper through `pkexec` (or directly when already
//! privileged), writes one request to its stdin and parses the response.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::protocol::{Payload, Request, Response};

/// Installed location of the helper binary
pub const DEFAULT_HELPER_PATH: &str = "/usr/libexec/ovpnctl/ovpnctl-helper";

/// Default privilege elevation program
pub const DEFAULT_PKEXEC: &str = "pkexec";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Helper or elevation program could not be started
    #[error("VPN helper not installed: {0}")]
    HelperNotFound(String),

    /// Helper exited without a parseable response
    #[error("Helper execution failed: {0}")]
    HelperFailed(String),

    /// Helper reported success but the output was not a response
    #[error("Invalid response from VPN helper: {0}")]
    InvalidResponse(String),

    /// Helper answered with an error response
    #[error("{message}")]
    Helper { code: String, message: String },
}

impl ClientError {
    /// Code to branch on; helper codes are passed through unchanged
    pub fn code(&self) -> &str {
        match self {
            ClientError::HelperNotFound(_) => "HELPER_NOT_FOUND",
            ClientError::HelperFailed(_) => "HELPER_FAILED",
            ClientError::InvalidResponse(_) => "INVALID_HELPER_RESPONSE",
            ClientError::Helper { code, .. } => code,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Run-state of a profile as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileStatus {
    pub active: bool,
    pub state: String,
}

/// Invokes the privileged helper, one process per request
#[derive(Debug, Clone)]
pub struct HelperClient {
    helper: PathBuf,
    elevate: Option<PathBuf>,
}

impl Default for HelperClient {
    fn default() -> Self {
        Self::new(DEFAULT_HELPER_PATH)
    }
}

impl HelperClient {
    /// Client that elevates through `pkexec`
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
            elevate: Some(PathBuf::from(DEFAULT_PKEXEC)),
        }
    }

    /// Use a different elevation program, or none
    pub fn with_elevation(mut self, elevate: Option<PathBuf>) -> Self {
        self.elevate = elevate;
        self
    }

    pub fn helper(&self) -> &Path {
        &self.helper
    }

    fn command(&self) -> Command {
        match &self.elevate {
            Some(elevate) => {
                let mut cmd = Command::new(elevate);
                cmd.arg(&self.helper);
                cmd
            }
            None => Command::new(&self.helper),
        }
    }

    /// Send one request and return the success payload
    pub async fn call(&self, request: &Request) -> ClientResult<Payload> {
        let body = serde_json::to_vec(request)
            .map_err(|e| ClientError::HelperFailed(format!("Failed to encode request: {}", e)))?;

        debug!("Calling helper {:?} for {}", self.helper, request.action());

        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ClientError::HelperNotFound(e.to_string()),
                _ => ClientError::HelperFailed(e.to_string()),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A helper that exits early closes the pipe; its output tells why
            if let Err(e) = stdin.write_all(&body).await {
                debug!("Writing request to helper failed: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClientError::HelperFailed(e.to_string()))?;

        interpret_output(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    pub async fn list_profiles(&self) -> ClientResult<Vec<String>> {
        let payload = self.call(&Request::ListProfiles).await?;
        Ok(payload.profiles.unwrap_or_default())
    }

    pub async fn install_profile(
        &self,
        profile_name: &str,
        ovpn_content: &str,
        username: &str,
        password: &str,
    ) -> ClientResult<()> {
        self.call(&Request::InstallProfile {
            profile_name: profile_name.to_string(),
            ovpn_content: ovpn_content.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn connect(&self, profile_name: &str) -> ClientResult<()> {
        self.call(&Request::Connect {
            profile_name: profile_name.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn disconnect(&self, profile_name: &str) -> ClientResult<()> {
        self.call(&Request::Disconnect {
            profile_name: profile_name.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn status(&self, profile_name: &str) -> ClientResult<ProfileStatus> {
        let payload = self
            .call(&Request::Status {
                profile_name: profile_name.to_string(),
            })
            .await?;
        Ok(ProfileStatus {
            active: payload.active.unwrap_or(false),
            state: payload.state.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// Map a finished helper process to a payload or error
///
/// The helper always answers with JSON on stdout. When it does not (for
/// example the elevation prompt was dismissed), stderr is the best
/// explanation available.
pub fn interpret_output(success: bool, stdout: &str, stderr: &str) -> ClientResult<Payload> {
    match serde_json::from_str::<Response>(stdout.trim()) {
        Ok(Response::Ok(payload)) if success => Ok(payload),
        Ok(Response::Error { code, message }) => Err(ClientError::Helper { code, message }),
        Ok(Response::Ok(_)) => Err(ClientError::Helper {
            code: "UNKNOWN_ERROR".to_string(),
            message: "Unknown error".to_string(),
        }),
        Err(e) if success => Err(ClientError::InvalidResponse(e.to_string())),
        Err(_) => {
            let stderr = stderr.trim();
            Err(ClientError::HelperFailed(if stderr.is_empty() {
                "Helper execution failed".to_string()
            } else {
                stderr.to_string()
            }))
        }
    }
}
