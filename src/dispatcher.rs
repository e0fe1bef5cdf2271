//! Request dispatcher
//!
//! Turns one request document into one [`Response`]:
//!
//! ```text
//! AwaitingRequest ──▶ Validating ──▶ Executing ──▶ Responded
//!        │                 │              │
//!        └─────────────────┴──────────────┴──▶ Responded (error)
//! ```
//!
//! Every handler validates its own fields before touching the store or
//! the service manager. Nothing is retained between requests.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HelperConfig;
use crate::error::{HelperError, HelperResult};
use crate::protocol::{Action, Payload, Response};
use crate::sanitizer::DirectivePolicy;
use crate::service::{ConnectLock, ServiceManager, Systemctl};
use crate::store::ProfileStore;
use crate::validation::{validate_credential, validate_profile_name, ProfileName};

/// A request that parsed as a JSON object with a known action
#[derive(Debug)]
pub struct RawRequest {
    pub action: Action,
    fields: Map<String, Value>,
}

impl RawRequest {
    /// Parse a request document
    pub fn parse(input: &str) -> HelperResult<Self> {
        let value: Value = serde_json::from_str(input)?;

        let fields = match value {
            Value::Object(fields) => fields,
            _ => {
                return Err(HelperError::InvalidJson(
                    "request must be a JSON object".to_string(),
                ))
            }
        };

        let action = match fields.get("action") {
            Some(Value::String(action)) => action.parse::<Action>()?,
            _ => return Err(HelperError::UnknownAction(None)),
        };

        Ok(Self { action, fields })
    }

    /// The validated `profile_name` field
    pub fn profile_name(&self) -> HelperResult<ProfileName> {
        match self.fields.get("profile_name") {
            Some(Value::String(name)) => validate_profile_name(name),
            Some(_) => Err(HelperError::InvalidProfileName(
                "profile_name must be a string".to_string(),
            )),
            None => Err(HelperError::InvalidProfileName(
                "profile_name is required".to_string(),
            )),
        }
    }

    /// A string field that is present and non-empty
    fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Routes requests to the store and the service manager
pub struct Dispatcher<S: ServiceManager> {
    store: ProfileStore,
    services: S,
    policy: DirectivePolicy,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl Dispatcher<Systemctl> {
    pub fn from_config(config: &HelperConfig) -> Self {
        Self::new(
            ProfileStore::new(&config.base_dir),
            Systemctl::from_config(config),
            config.directive_policy(),
            config.lock_path.clone(),
            config.command_timeout(),
        )
    }
}

impl<S: ServiceManager> Dispatcher<S> {
    pub fn new(
        store: ProfileStore,
        services: S,
        policy: DirectivePolicy,
        lock_path: PathBuf,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            services,
            policy,
            lock_path,
            lock_timeout,
        }
    }

    /// Handle one request document, always producing exactly one response
    pub async fn dispatch(&self, input: &str) -> Response {
        match self.handle(input).await {
            Ok(payload) => Response::Ok(payload),
            Err(e) => {
                warn!("Request failed [{}]: {}", e.code(), e);
                e.into()
            }
        }
    }

    async fn handle(&self, input: &str) -> HelperResult<Payload> {
        let request = RawRequest::parse(input)?;
        debug!("Dispatching {}", request.action);

        match request.action {
            Action::ListProfiles => self.list_profiles().await,
            Action::InstallProfile => self.install_profile(&request).await,
            Action::Connect => self.connect(&request).await,
            Action::Disconnect => self.disconnect(&request).await,
            Action::Status => self.status(&request).await,
        }
    }

    async fn list_profiles(&self) -> HelperResult<Payload> {
        Ok(Payload::profiles(self.store.list().await?))
    }

    async fn install_profile(&self, request: &RawRequest) -> HelperResult<Payload> {
        let name = request.profile_name()?;

        let (ovpn, username, password) = match (
            request.non_empty_str("ovpn_content"),
            request.non_empty_str("username"),
            request.non_empty_str("password"),
        ) {
            (Some(ovpn), Some(username), Some(password)) => (ovpn, username, password),
            (ovpn, username, password) => {
                let missing = [
                    ("ovpn_content", ovpn.is_none()),
                    ("username", username.is_none()),
                    ("password", password.is_none()),
                ]
                .into_iter()
                .filter(|(_, missing)| *missing)
                .map(|(field, _)| field)
                .collect();
                return Err(HelperError::MissingFields(missing));
            }
        };

        validate_credential("username", username)?;
        validate_credential("password", password)?;

        info!("Installing profile {}", name);
        let sanitized = self.policy.sanitize(ovpn);
        let paths = self.store.install(&name, &sanitized, username, password).await?;

        // Files stay on disk only once the unit is enabled
        if let Err(e) = self.enable_installed(&name).await {
            warn!("Rolling back install of {}: {}", name, e);
            self.store.rollback(&paths).await;
            return Err(e);
        }

        Ok(Payload::default())
    }

    async fn enable_installed(&self, name: &ProfileName) -> HelperResult<()> {
        self.services.reload().await?;
        self.services.enable(name).await
    }

    async fn connect(&self, request: &RawRequest) -> HelperResult<Payload> {
        let name = request.profile_name()?;

        if !self.store.conf_exists(&name).await? {
            return Err(HelperError::ProfileNotFound(name.to_string()));
        }

        // Held until the start has completed
        let _lock = ConnectLock::acquire(&self.lock_path, self.lock_timeout).await?;

        let active = self.services.active_profiles().await?;
        let only_requested = active.len() == 1 && active.contains(name.as_str());
        if !active.is_empty() && !only_requested {
            return Err(HelperError::AnotherVpnActive {
                requested: name.to_string(),
                active: active.into_iter().collect(),
            });
        }

        info!("Connecting profile {}", name);
        self.services.start(&name).await?;

        Ok(Payload::default())
    }

    async fn disconnect(&self, request: &RawRequest) -> HelperResult<Payload> {
        let name = request.profile_name()?;

        info!("Disconnecting profile {}", name);
        self.services.stop(&name).await?;

        Ok(Payload::default())
    }

    async fn status(&self, request: &RawRequest) -> HelperResult<Payload> {
        let name = request.profile_name()?;

        let state = self.services.is_active(&name).await?;
        Ok(Payload::status(state.is_active(), state.as_str()))
    }
}
