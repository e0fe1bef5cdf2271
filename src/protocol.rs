//! Request/response protocol between the client and the helper
//!
//! One JSON object in, one JSON object out:
//!
//! ```text
//! {"action":"status","profile_name":"work"}
//! {"status":"ok","active":true,"state":"active"}
//! {"status":"error","code":"INVALID_PROFILE_NAME","message":"..."}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::error::{HelperError, HelperResult};

/// Upper bound on a request document
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

/// Read one request document, refusing oversized or non-UTF-8 input
pub fn read_request<R: Read>(reader: R) -> HelperResult<String> {
    let mut buf = Vec::new();
    reader.take(MAX_REQUEST_BYTES + 1).read_to_end(&mut buf)?;

    if buf.len() as u64 > MAX_REQUEST_BYTES {
        return Err(HelperError::InvalidJson(format!(
            "request exceeds {} bytes",
            MAX_REQUEST_BYTES
        )));
    }

    String::from_utf8(buf)
        .map_err(|_| HelperError::InvalidJson("request is not valid UTF-8".to_string()))
}

/// Actions the helper understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListProfiles,
    InstallProfile,
    Connect,
    Disconnect,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ListProfiles => "list_profiles",
            Action::InstallProfile => "install_profile",
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::Status => "status",
        }
    }
}

impl FromStr for Action {
    type Err = HelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list_profiles" => Ok(Action::ListProfiles),
            "install_profile" => Ok(Action::InstallProfile),
            "connect" => Ok(Action::Connect),
            "disconnect" => Ok(Action::Disconnect),
            "status" => Ok(Action::Status),
            other => Err(HelperError::UnknownAction(Some(other.to_string()))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A well-formed request, as built by callers
///
/// The helper does not deserialize into this type directly; it inspects the
/// raw object so that each missing or malformed field maps to its own error
/// code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    ListProfiles,
    InstallProfile {
        profile_name: String,
        ovpn_content: String,
        username: String,
        password: String,
    },
    Connect {
        profile_name: String,
    },
    Disconnect {
        profile_name: String,
    },
    Status {
        profile_name: String,
    },
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::ListProfiles => Action::ListProfiles,
            Request::InstallProfile { .. } => Action::InstallProfile,
            Request::Connect { .. } => Action::Connect,
            Request::Disconnect { .. } => Action::Disconnect,
            Request::Status { .. } => Action::Status,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::ListProfiles => f.write_str("ListProfiles"),
            Request::InstallProfile {
                profile_name,
                ovpn_content,
                username,
                ..
            } => f
                .debug_struct("InstallProfile")
                .field("profile_name", profile_name)
                .field("ovpn_content_len", &ovpn_content.len())
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Request::Connect { profile_name } => {
                f.debug_struct("Connect").field("profile_name", profile_name).finish()
            }
            Request::Disconnect { profile_name } => {
                f.debug_struct("Disconnect").field("profile_name", profile_name).finish()
            }
            Request::Status { profile_name } => {
                f.debug_struct("Status").field("profile_name", profile_name).finish()
            }
        }
    }
}

/// Success payload; absent fields are omitted from the JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Payload {
    pub fn profiles(profiles: Vec<String>) -> Self {
        Self {
            profiles: Some(profiles),
            ..Self::default()
        }
    }

    pub fn status(active: bool, state: impl Into<String>) -> Self {
        Self {
            active: Some(active),
            state: Some(state.into()),
            ..Self::default()
        }
    }
}

/// The single response object written by the helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok(Payload),
    Error { code: String, message: String },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(Payload::default())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    /// Process exit status matching this response
    pub fn exit_code(&self) -> u8 {
        if self.is_ok() {
            0
        } else {
            1
        }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","code":"INTERNAL_ERROR","message":"Failed to encode response"}"#
                .to_string()
        })
    }
}

impl From<HelperError> for Response {
    fn from(error: HelperError) -> Self {
        Response::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn as_value(response: &Response) -> Value {
        serde_json::from_str(&response.to_json()).unwrap()
    }

    #[test]
    fn test_read_request_limits() {
        assert_eq!(read_request(&b"{\"action\":\"list_profiles\"}"[..]).unwrap(), "{\"action\":\"list_profiles\"}");
        assert_eq!(read_request(&[0xffu8, 0xfe][..]).unwrap_err().code(), "INVALID_JSON");

        let oversized = vec![b' '; MAX_REQUEST_BYTES as usize + 1];
        assert_eq!(read_request(&oversized[..]).unwrap_err().code(), "INVALID_JSON");
    }

    #[test]
    fn test_action_names() {
        for action in [
            Action::ListProfiles,
            Action::InstallProfile,
            Action::Connect,
            Action::Disconnect,
            Action::Status,
        ] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!("delete_profile".parse::<Action>().unwrap_err().code(), "UNKNOWN_ACTION");
        assert!("Connect".parse::<Action>().is_err());
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(as_value(&Response::ok()), json!({"status": "ok"}));
        assert_eq!(
            as_value(&Response::Ok(Payload::profiles(vec!["a".into(), "b".into()]))),
            json!({"status": "ok", "profiles": ["a", "b"]})
        );
        assert_eq!(
            as_value(&Response::Ok(Payload::status(false, "inactive"))),
            json!({"status": "ok", "active": false, "state": "inactive"})
        );

        let error: Response = HelperError::ProfileNotFound("work".into()).into();
        let value = as_value(&error);
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "PROFILE_NOT_FOUND");
        assert!(value["message"].as_str().unwrap().contains("work"));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_response_parses_back() {
        let ok: Response = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(ok, Response::ok());

        let status: Response =
            serde_json::from_str(r#"{"status":"ok","active":true,"state":"active"}"#).unwrap();
        assert_eq!(status, Response::Ok(Payload::status(true, "active")));

        let err: Response =
            serde_json::from_str(r#"{"status":"error","code":"TIMEOUT","message":"slow"}"#).unwrap();
        assert!(!err.is_ok());
    }

    #[test]
    fn test_request_wire_format() {
        let request = Request::InstallProfile {
            profile_name: "work".into(),
            ovpn_content: "client\n".into(),
            username: "alice".into(),
            password: "s3cret".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "install_profile");
        assert_eq!(value["profile_name"], "work");
        assert_eq!(value["password"], "s3cret");

        assert_eq!(
            serde_json::to_value(Request::ListProfiles).unwrap(),
            json!({"action": "list_profiles"})
        );
    }

    #[test]
    fn test_request_debug_redacts_password() {
        let request = Request::InstallProfile {
            profile_name: "work".into(),
            ovpn_content: "client\n".into(),
            username: "alice".into(),
            password: "s3cret".into(),
        };
        let debug = format!("{:?}", request);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("s3cret"));
        assert_eq!(request.action(), Action::InstallProfile);
    }
}
