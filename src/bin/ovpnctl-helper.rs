//! Privileged OpenVPN profile helper (ovpnctl-helper)
//!
//! Started as root through pkexec for every request. Reads one JSON request
//! from stdin, writes one JSON response to stdout and exits with 0 on
//! success or 1 on failure. Diagnostics go to stderr.
//!
//! # Usage
//!
//! ```bash
//! echo '{"action":"status","profile_name":"work"}' | pkexec ovpnctl-helper
//! ```
//!
//! Arguments are ignored; configuration comes only from
//! `/etc/ovpnctl/helper.toml`.

use libovpnctl::config::{HelperConfig, DEFAULT_CONFIG_PATH};
use libovpnctl::dispatcher::Dispatcher;
use libovpnctl::protocol::{read_request, Response};
use std::io::Write;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    #[cfg(target_os = "linux")]
    {
        let euid = unsafe { libc::geteuid() };
        if euid != 0 {
            warn!("Not running as root (euid {}) - profile operations will likely fail", euid);
        }
    }

    let response = handle().await;
    emit(&response);
    ExitCode::from(response.exit_code())
}

async fn handle() -> Response {
    let config = match HelperConfig::load_or_default(DEFAULT_CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => return e.into(),
    };
    debug!("Using profile directory {:?}", config.base_dir);

    let input = match read_request(std::io::stdin().lock()) {
        Ok(input) => input,
        Err(e) => return e.into(),
    };

    Dispatcher::from_config(&config).dispatch(&input).await
}

fn emit(response: &Response) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", response.to_json()).and_then(|_| stdout.flush()) {
        warn!("Failed to write response: {}", e);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("OVPNCTL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the response; logs must stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
