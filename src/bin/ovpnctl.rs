//! OpenVPN profile CLI (ovpnctl)
//!
//! Unprivileged front end for the privileged helper.
//!
//! # Usage
//!
//! ```bash
//! ovpnctl list
//! echo 's3cret' | ovpnctl install work --config work.ovpn --username alice
//! ovpnctl connect work
//! ovpnctl status work
//! ovpnctl disconnect work
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use libovpnctl::client::{ClientError, HelperClient, DEFAULT_HELPER_PATH, DEFAULT_PKEXEC};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// OpenVPN profile manager
#[derive(Parser, Debug)]
#[command(name = "ovpnctl")]
#[command(version)]
#[command(about = "Manage OpenVPN profiles through the privileged ovpnctl helper", long_about = None)]
struct Args {
    /// Path to the privileged helper
    #[arg(long, default_value = DEFAULT_HELPER_PATH)]
    helper: PathBuf,

    /// Privilege elevation program
    #[arg(long, default_value = DEFAULT_PKEXEC)]
    pkexec: PathBuf,

    /// Run the helper directly instead of through the elevation program
    #[arg(long)]
    no_elevate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List installed profiles
    List,
    /// Install a profile from an .ovpn file; the password is read from stdin
    Install {
        /// Profile name (letters, digits, '-' and '_')
        name: String,
        /// OpenVPN configuration file to import
        #[arg(short, long)]
        config: PathBuf,
        /// VPN username
        #[arg(short, long)]
        username: String,
    },
    /// Start a profile's VPN connection
    Connect { name: String },
    /// Stop a profile's VPN connection
    Disconnect { name: String },
    /// Show whether a profile's VPN connection is active
    Status { name: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ClientError>() {
                Some(client_error) => eprintln!("Error [{}]: {}", client_error.code(), client_error),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let elevate = if args.no_elevate { None } else { Some(args.pkexec) };
    let client = HelperClient::new(args.helper).with_elevation(elevate);
    debug!("Using helper {:?}", client.helper());

    match args.command {
        Commands::List => {
            for profile in client.list_profiles().await? {
                println!("{}", profile);
            }
        }
        Commands::Install { name, config, username } => {
            let content = tokio::fs::read_to_string(&config)
                .await
                .with_context(|| format!("Failed to read {:?}", config))?;
            let password = read_password()?;

            client.install_profile(&name, &content, &username, &password).await?;
            println!("Installed profile {}", name);
        }
        Commands::Connect { name } => {
            client.connect(&name).await?;
            println!("Connecting {}", name);
        }
        Commands::Disconnect { name } => {
            client.disconnect(&name).await?;
            println!("Disconnected {}", name);
        }
        Commands::Status { name } => {
            let status = client.status(&name).await?;
            println!("{}: {}", name, status.state);
        }
    }

    Ok(())
}

fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("No password given on stdin");
    }
    Ok(password)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("OVPNCTL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
