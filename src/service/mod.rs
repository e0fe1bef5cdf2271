//! Service orchestration for ovpnctl
//!
//! Wraps the host service manager behind the [`ServiceManager`] trait. The
//! production implementation drives `systemctl` with one templated unit per
//! profile:
//!
//! ```text
//! ┌──────────────────────────┐
//! │        Dispatcher        │
//! └────────────┬─────────────┘
//!              │ ServiceManager
//!              ▼
//! ┌──────────────────────────┐      ┌────────────────────────┐
//! │        Systemctl         │ ───▶ │ openvpn@<name>.service │
//! └──────────────────────────┘      └────────────────────────┘
//! ```
//!
//! Child processes run under a bounded timeout, and connect requests from
//! separate helper processes serialize on a [`ConnectLock`].

pub mod backend;
pub mod common;
pub mod lock;
pub mod systemd;

pub use backend::{ServiceManager, UnitState};
pub use lock::ConnectLock;
pub use systemd::Systemctl;

#[cfg(test)]
pub use backend::MockServiceManager;
