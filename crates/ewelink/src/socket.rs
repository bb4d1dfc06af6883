use serde::{Deserialize, Serialize};

use crate::cloud::{API_VERSION, SwitchParams};

/// Text frame sent periodically to keep the push socket alive.
pub const PING: &str = "ping";

/// Reply to [`PING`].
pub const PONG: &str = "pong";

/// Inbound push socket message.
///
/// State changes arrive as `{"action": "update", "deviceid": .., "params":
/// {..}}`, failures as `{"error": <code>}`. Anything else (handshake
/// replies, unrelated actions) is still parsed, so the caller can decide to
/// ignore it.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SocketMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviceid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<SwitchParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<i64>,
}

impl SocketMessage {
    pub const ACTION_UPDATE: &'static str = "update";

    #[must_use]
    pub fn update(deviceid: &str, switch: &str) -> Self {
        Self {
            action: Some(Self::ACTION_UPDATE.to_string()),
            deviceid: Some(deviceid.to_string()),
            params: Some(SwitchParams {
                switch: Some(switch.to_string()),
            }),
            error: None,
        }
    }

    #[must_use]
    pub fn is_update(&self) -> bool {
        self.action.as_deref() == Some(Self::ACTION_UPDATE)
    }

    /// Non-zero error code, if this message reports a failure.
    #[must_use]
    pub fn error_code(&self) -> Option<i64> {
        self.error.filter(|code| *code != 0)
    }

    #[must_use]
    pub fn switch_state(&self) -> Option<&str> {
        self.params.as_ref()?.switch.as_deref()
    }
}

/// Handshake sent right after the socket connects.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserOnline<'a> {
    pub action: &'static str,
    pub at: &'a str,
    pub apikey: &'a str,
    pub appid: &'a str,
    pub nonce: String,
    pub ts: i64,
    pub user_agent: &'static str,
    pub sequence: String,
    pub version: u32,
}

impl<'a> UserOnline<'a> {
    #[must_use]
    pub fn new(at: &'a str, apikey: &'a str, appid: &'a str, nonce: String, ts: i64) -> Self {
        Self {
            action: "userOnline",
            at,
            apikey,
            appid,
            nonce,
            ts,
            user_agent: "app",
            sequence: (ts * 1000).to_string(),
            version: API_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::socket::{SocketMessage, UserOnline};

    #[test]
    fn parse_update() {
        let msg: SocketMessage = serde_json::from_str(
            r#"{"action": "update", "deviceid": "1000abcdef", "apikey": "k",
                "userAgent": "device", "params": {"switch": "off"}}"#,
        )
        .unwrap();

        assert!(msg.is_update());
        assert_eq!(msg.deviceid.as_deref(), Some("1000abcdef"));
        assert_eq!(msg.switch_state(), Some("off"));
        assert_eq!(msg.error_code(), None);
    }

    #[test]
    fn parse_error() {
        let msg: SocketMessage = serde_json::from_str(r#"{"error": 406}"#).unwrap();

        assert!(!msg.is_update());
        assert_eq!(msg.error_code(), Some(406));
    }

    #[test]
    fn handshake_ack_is_not_an_error() {
        let msg: SocketMessage =
            serde_json::from_str(r#"{"error": 0, "apikey": "k", "config": {}}"#).unwrap();

        assert_eq!(msg.error_code(), None);
        assert!(!msg.is_update());
    }

    #[test]
    fn user_online_shape() {
        let hello = UserOnline::new("token", "key", "app", "abcd1234".to_string(), 1_700_000_000);
        let json = serde_json::to_value(&hello).unwrap();

        assert_eq!(json["action"], "userOnline");
        assert_eq!(json["userAgent"], "app");
        assert_eq!(json["version"], 8);
    }
}
