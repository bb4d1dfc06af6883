use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::device::{Device, DeviceParams};
use crate::error::{EwelinkError, EwelinkResult};

/// mDNS service type advertised by devices in LAN mode.
pub const SERVICE_TYPE: &str = "_ewelink._tcp.local.";

pub const INFO_PATH: &str = "/zeroconf/info";
pub const SWITCH_PATH: &str = "/zeroconf/switch";

/// Extract the device id from an mDNS instance or host name.
///
/// Devices announce themselves as `eWeLink_<deviceid>._ewelink._tcp.local.`
/// with host name `eWeLink_<deviceid>.local.`.
#[must_use]
pub fn device_id_from_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix("eWeLink_")?;
    let id = rest.split('.').next()?;
    (!id.is_empty()).then_some(id)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LanRequest {
    pub deviceid: String,
    pub data: Value,
}

impl LanRequest {
    #[must_use]
    pub fn info(deviceid: &str) -> Self {
        Self {
            deviceid: deviceid.to_string(),
            data: json!({}),
        }
    }

    #[must_use]
    pub fn switch(deviceid: &str, state: &str) -> Self {
        Self {
            deviceid: deviceid.to_string(),
            data: json!({ "switch": state }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LanInfo {
    #[serde(default)]
    pub switch: Option<String>,
    #[serde(default)]
    pub fw_version: Option<String>,
    #[serde(default)]
    pub bssid: Option<String>,
}

impl LanInfo {
    /// Build a device record from what the LAN reply tells us.
    ///
    /// Devices in LAN mode know nothing about their cloud name, so the id
    /// doubles as the display name.
    #[must_use]
    pub fn into_device(self, device_id: &str) -> Device {
        let mut dev = Device {
            device_id: device_id.to_string(),
            name: device_id.to_string(),
            params: DeviceParams {
                switch: self.switch,
                fw_version: self.fw_version,
            },
            ..Device::default()
        };
        if let Some(bssid) = self.bssid {
            dev.extra.extra.mac = bssid;
        }
        dev
    }
}

/// `data` is an object on current firmware, a JSON encoded string on older.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum LanData {
    Object(LanInfo),
    Encoded(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct LanReply {
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub data: Option<LanData>,
}

impl LanReply {
    pub fn into_info(self) -> EwelinkResult<LanInfo> {
        if self.error != 0 {
            return Err(EwelinkError::Cloud {
                code: self.error,
                msg: "device rejected request".to_string(),
            });
        }
        match self.data {
            Some(LanData::Object(info)) => Ok(info),
            Some(LanData::Encoded(text)) => Ok(serde_json::from_str(&text)?),
            None => Err(EwelinkError::MissingData),
        }
    }
}
