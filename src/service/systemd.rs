use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::HelperConfig;
use crate::error::HelperResult;
use crate::validation::{validate_profile_name, ProfileName};
use super::backend::{ServiceManager, UnitState};
use super::common::{run_checked, run_command};

/// `systemctl`-backed service manager using a templated unit per profile
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: PathBuf,
    unit_prefix: String,
    timeout: Duration,
}

impl Systemctl {
    pub fn new(program: impl Into<PathBuf>, unit_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            unit_prefix: unit_prefix.into(),
            timeout,
        }
    }

    pub fn from_config(config: &HelperConfig) -> Self {
        Self::new(&config.systemctl, &config.unit_prefix, config.command_timeout())
    }

    /// Unit instance for a profile, e.g. `openvpn@work.service`
    pub fn unit_name(&self, name: &ProfileName) -> String {
        format!("{}@{}.service", self.unit_prefix, name)
    }

    async fn unit_command(&self, verb: &str, name: &ProfileName) -> HelperResult<()> {
        let unit = self.unit_name(name);
        run_checked(&self.program, &[verb, &unit], self.timeout).await?;
        info!("systemctl {} {}", verb, unit);
        Ok(())
    }
}

/// Extract profile names from `systemctl list-units --plain --no-legend` output
///
/// Only instances of `<unit_prefix>@<name>.service` are considered, and
/// instance names that fail the profile allowlist are skipped.
pub fn parse_active_units(output: &str, unit_prefix: &str) -> BTreeSet<String> {
    let instance_prefix = format!("{}@", unit_prefix);
    let mut names = BTreeSet::new();

    for line in output.lines() {
        let mut columns = line.split_whitespace();
        let unit = match columns.next() {
            // Status marker column shown for some unit states
            Some("●") | Some("*") => columns.next(),
            other => other,
        };

        let name = unit
            .and_then(|u| u.strip_prefix(instance_prefix.as_str()))
            .and_then(|u| u.strip_suffix(".service"));

        if let Some(name) = name {
            match validate_profile_name(name) {
                Ok(name) => {
                    names.insert(name.as_str().to_string());
                }
                Err(_) => debug!("Ignoring unit instance with unexpected name: {}", name),
            }
        }
    }

    names
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn reload(&self) -> HelperResult<()> {
        run_checked(&self.program, &["daemon-reload"], self.timeout).await?;
        debug!("systemctl daemon-reload");
        Ok(())
    }

    async fn enable(&self, name: &ProfileName) -> HelperResult<()> {
        self.unit_command("enable", name).await
    }

    async fn start(&self, name: &ProfileName) -> HelperResult<()> {
        self.unit_command("start", name).await
    }

    async fn stop(&self, name: &ProfileName) -> HelperResult<()> {
        self.unit_command("stop", name).await
    }

    async fn active_profiles(&self) -> HelperResult<BTreeSet<String>> {
        let output = run_checked(
            &self.program,
            &[
                "list-units",
                "--type=service",
                "--state=active",
                "--plain",
                "--no-legend",
                "--no-pager",
            ],
            self.timeout,
        )
        .await?;

        let active = parse_active_units(&output.stdout, &self.unit_prefix);
        debug!("Active profiles: {:?}", active);
        Ok(active)
    }

    async fn is_active(&self, name: &ProfileName) -> HelperResult<UnitState> {
        let unit = self.unit_name(name);
        // is-active exits non-zero for anything but an active unit
        let output = run_command(&self.program, &["is-active", &unit], self.timeout).await?;
        Ok(UnitState::new(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn name(s: &str) -> ProfileName {
        validate_profile_name(s).unwrap()
    }

    #[test]
    fn test_unit_name() {
        let systemctl = Systemctl::new("systemctl", "openvpn", Duration::from_secs(1));
        assert_eq!(systemctl.unit_name(&name("work")), "openvpn@work.service");

        let client = Systemctl::new("systemctl", "openvpn-client", Duration::from_secs(1));
        assert_eq!(client.unit_name(&name("home")), "openvpn-client@home.service");
    }

    #[test]
    fn test_parse_active_units() {
        let output = "\
openvpn@work.service          loaded active running OpenVPN connection to work
sshd.service                  loaded active running OpenSSH Daemon
● openvpn@home.service        loaded active running OpenVPN connection to home
openvpn-client@other.service  loaded active running OpenVPN tunnel for other
openvpn@bad\\x2dname.service   loaded active running escaped
openvpn.service               loaded active exited  OpenVPN service
";
        let active = parse_active_units(output, "openvpn");
        let expected: BTreeSet<String> = ["home", "work"].iter().map(|s| s.to_string()).collect();
        assert_eq!(active, expected);

        let client = parse_active_units(output, "openvpn-client");
        assert_eq!(client.into_iter().collect::<Vec<_>>(), vec!["other".to_string()]);

        assert!(parse_active_units("", "openvpn").is_empty());
    }

    /// Write a stand-in `systemctl` that logs its arguments and answers
    /// according to the first argument.
    fn fake_systemctl(dir: &TempDir) -> (PathBuf, PathBuf) {
        let log = dir.path().join("calls.log");
        let script = dir.path().join("systemctl");
        let body = format!(
            r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1" in
  list-units)
    echo "openvpn@work.service loaded active running OpenVPN work"
    echo "cron.service loaded active running cron"
    ;;
  is-active)
    if [ "$2" = "openvpn@work.service" ]; then echo active; exit 0; fi
    echo inactive
    exit 3
    ;;
  start)
    if [ "$2" = "openvpn@broken.service" ]; then echo "Job failed" >&2; exit 1; fi
    ;;
  stop)
    sleep 5
    ;;
esac
exit 0
"#,
            log = log.display()
        );
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    // One test so that only a single thread in this binary forks at a time
    #[tokio::test]
    async fn test_systemctl_against_fake_binary() {
        let dir = TempDir::new().unwrap();
        let (script, log) = fake_systemctl(&dir);
        let systemctl = Systemctl::new(&script, "openvpn", Duration::from_millis(1500));

        systemctl.reload().await.unwrap();
        systemctl.enable(&name("work")).await.unwrap();
        systemctl.start(&name("work")).await.unwrap();

        let active = systemctl.active_profiles().await.unwrap();
        assert_eq!(active.into_iter().collect::<Vec<_>>(), vec!["work".to_string()]);

        assert!(systemctl.is_active(&name("work")).await.unwrap().is_active());
        let missing = systemctl.is_active(&name("missingprofile")).await.unwrap();
        assert_eq!(missing.as_str(), "inactive");

        let err = systemctl.start(&name("broken")).await.unwrap_err();
        assert_eq!(err.code(), "SYSTEMCTL_FAILED");

        let err = systemctl.stop(&name("work")).await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");

        let calls = fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls[0], "daemon-reload");
        assert_eq!(calls[1], "enable openvpn@work.service");
        assert_eq!(calls[2], "start openvpn@work.service");
        assert!(calls[3].starts_with("list-units --type=service --state=active"));

        let gone = Systemctl::new(dir.path().join("no-such-systemctl"), "openvpn", Duration::from_secs(1));
        assert_eq!(gone.reload().await.unwrap_err().code(), "SYSTEMCTL_FAILED");
        assert_eq!(gone.is_active(&name("work")).await.unwrap_err().code(), "SYSTEMCTL_FAILED");
    }
}
