use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{HelperError, HelperResult};
use crate::validation::sanitize_error_message;

/// Captured result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Render a command line for logs and error messages
pub fn display_command(program: &Path, args: &[&str]) -> String {
    let mut cmd = program.display().to_string();
    for arg in args {
        cmd.push(' ');
        cmd.push_str(arg);
    }
    cmd
}

/// Run `program` with `args`, waiting at most `timeout`
///
/// The child gets a null stdin so it can never read the helper's request.
/// On timeout the child is killed and [`HelperError::Timeout`] is returned.
/// A non-zero exit is not an error here; callers decide.
pub async fn run_command(program: &Path, args: &[&str], timeout: Duration) -> HelperResult<CommandOutput> {
    let cmd = display_command(program, args);
    debug!("Running: {}", cmd);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| HelperError::CommandFailed {
            cmd: cmd.clone(),
            code: None,
            stderr: e.to_string(),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| HelperError::CommandFailed {
            cmd: cmd.clone(),
            code: None,
            stderr: e.to_string(),
        })?,
        Err(_) => {
            warn!("'{}' did not finish within {:?}", cmd, timeout);
            return Err(HelperError::Timeout(format!(
                "'{}' did not finish within {} seconds",
                cmd,
                timeout.as_secs()
            )));
        }
    };

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!("'{}' exited with {:?}", cmd, result.code);
    Ok(result)
}

/// Run a command that must exit successfully
pub async fn run_checked(program: &Path, args: &[&str], timeout: Duration) -> HelperResult<CommandOutput> {
    let output = run_command(program, args, timeout).await?;

    if !output.success() {
        let cmd = display_command(program, args);
        let stderr = sanitize_error_message(&output.stderr);
        warn!("'{}' failed with {:?}: {}", cmd, output.code, stderr);
        return Err(HelperError::CommandFailed {
            cmd,
            code: output.code,
            stderr,
        });
    }

    Ok(output)
}
