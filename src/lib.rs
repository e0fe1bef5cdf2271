//! ovpnctl - OpenVPN profile management library
//!
//! Privileged helper and unprivileged client for managing OpenVPN profiles
//! from a desktop session:
//! - Profile name and path validation
//! - Sanitizing imported OpenVPN configuration
//! - Profile storage (`<name>.conf` / `<name>.auth`)
//! - systemd unit orchestration (`openvpn@<name>.service`)
//! - One-shot JSON request dispatch
//!
//! The helper runs as root, handles exactly one request read from stdin
//! and exits. The client spawns it through `pkexec`.

pub mod error;
pub mod config;
pub mod validation;
pub mod sanitizer;
pub mod store;
pub mod service;
pub mod protocol;
pub mod dispatcher;
pub mod client;

// Re-export commonly used types
pub use error::{HelperError, HelperResult};
pub use config::{HelperConfig, DEFAULT_CONFIG_PATH};
pub use validation::{validate_profile_name, resolve_profile_paths, ProfileName, ProfilePaths};
pub use sanitizer::{sanitize, DirectiveKind, DirectivePolicy, DirectiveRule, MatchStrategy};
pub use store::ProfileStore;
pub use service::{ConnectLock, ServiceManager, Systemctl, UnitState};
pub use protocol::{Action, Payload, Request, Response};
pub use dispatcher::Dispatcher;
pub use client::{ClientError, ClientResult, HelperClient, ProfileStatus};
