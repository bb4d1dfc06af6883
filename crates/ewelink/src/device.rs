use serde::{Deserialize, Serialize};

/// Device record, as returned by the cloud device endpoints.
///
/// Only the fields the bridge reads are modelled. Everything is defaulted,
/// since LAN replies carry a much smaller subset than the cloud does.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "apikey")]
    pub api_key: String,
    #[serde(default)]
    pub product_model: String,
    #[serde(default)]
    pub params: DeviceParams,
    #[serde(default)]
    pub extra: DeviceExtraOuter,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DeviceExtraOuter {
    #[serde(default)]
    pub extra: DeviceExtra,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DeviceExtra {
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub model: String,
}

impl Device {
    #[must_use]
    pub fn switch_state(&self) -> Option<&str> {
        self.params.switch.as_deref()
    }
}

/// Result of a state read or state change.
///
/// A non-zero `error` means the device refused or could not be reached.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl DeviceState {
    #[must_use]
    pub fn ok(state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            error: None,
            msg: None,
        }
    }

    #[must_use]
    pub fn failed(error: i64, msg: impl Into<String>) -> Self {
        Self {
            state: None,
            error: Some(error),
            msg: Some(msg.into()),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some_and(|code| code != 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::device::{Device, DeviceState};

    #[test]
    fn parse_cloud_device() {
        let dev: Device = serde_json::from_str(
            r#"{
                "deviceid": "1000abcdef",
                "name": "Kitchen Switch",
                "apikey": "5f3c-key",
                "productModel": "BASIC",
                "online": true,
                "params": {"switch": "on", "fwVersion": "3.5.0", "rssi": -51},
                "extra": {"extra": {"mac": "d0:27:00:aa:bb:cc", "model": "PSA-BHA-GL"}}
            }"#,
        )
        .unwrap();

        assert_eq!(dev.device_id, "1000abcdef");
        assert_eq!(dev.product_model, "BASIC");
        assert_eq!(dev.switch_state(), Some("on"));
        assert_eq!(dev.params.fw_version.as_deref(), Some("3.5.0"));
        assert_eq!(dev.extra.extra.mac, "d0:27:00:aa:bb:cc");
        assert_eq!(dev.extra.extra.model, "PSA-BHA-GL");
    }

    #[test]
    fn parse_sparse_device() {
        let dev: Device = serde_json::from_str(r#"{"deviceid": "1000abcdef"}"#).unwrap();

        assert_eq!(dev.name, "");
        assert_eq!(dev.switch_state(), None);
    }

    #[test]
    fn state_error_detection() {
        assert!(!DeviceState::ok("on").is_error());
        assert!(DeviceState::failed(503, "offline").is_error());

        let zero: DeviceState = serde_json::from_str(r#"{"state": "off", "error": 0}"#).unwrap();
        assert!(!zero.is_error());
    }
}
