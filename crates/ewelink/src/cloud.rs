use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{EwelinkError, EwelinkResult};

/// Protocol version sent with every cloud request.
pub const API_VERSION: u32 = 8;

/// Error code returned by login when the account lives in another region.
pub const ERROR_REGION_REDIRECT: i64 = 301;

/// Error code returned for devices that no longer exist on the account.
pub const ERROR_NOT_FOUND: i64 = 404;

#[must_use]
pub fn api_base_url(region: &str) -> String {
    format!("https://{region}-api.coolkit.cc:8080")
}

#[must_use]
pub fn socket_url(region: &str) -> String {
    format!("wss://{region}-pconnect3.coolkit.cc:8080/api/ws")
}

#[derive(Debug, Serialize, Clone)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub version: u32,
    pub ts: i64,
    pub nonce: String,
    pub appid: &'a str,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoginUser {
    #[serde(default)]
    pub apikey: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoginResponse {
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub user: Option<LoginUser>,
    #[serde(default)]
    pub error: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl LoginResponse {
    /// Region the cloud asked us to retry against, if any.
    #[must_use]
    pub fn redirect(&self) -> Option<&str> {
        match self.error {
            Some(ERROR_REGION_REDIRECT) => self.region.as_deref(),
            _ => None,
        }
    }
}

/// Access token and account details from a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub at: String,
    pub apikey: String,
    pub region: String,
}

impl TryFrom<LoginResponse> for Session {
    type Error = EwelinkError;

    fn try_from(resp: LoginResponse) -> EwelinkResult<Self> {
        if let Some(code) = resp.error.filter(|code| *code != 0) {
            return Err(EwelinkError::Cloud {
                code,
                msg: resp.msg.unwrap_or_default(),
            });
        }

        match (resp.at, resp.region) {
            (Some(at), Some(region)) => Ok(Self {
                at,
                apikey: resp.user.map(|u| u.apikey).unwrap_or_default(),
                region,
            }),
            _ => Err(EwelinkError::MissingData),
        }
    }
}

/// Envelope shared by all cloud replies.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CloudReply<T> {
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(flatten)]
    pub body: Option<T>,
}

impl<T> CloudReply<T> {
    pub fn into_result(self) -> EwelinkResult<T> {
        if self.error != 0 {
            return Err(EwelinkError::Cloud {
                code: self.error,
                msg: self.msg.unwrap_or_default(),
            });
        }
        self.body.ok_or(EwelinkError::MissingData)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceList {
    #[serde(default)]
    pub devicelist: Vec<Device>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SwitchParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusBody {
    #[serde(default)]
    pub params: SwitchParams,
}

#[derive(Debug, Serialize, Clone)]
pub struct StatusRequest<'a> {
    pub deviceid: &'a str,
    pub params: SwitchParams,
    pub appid: &'a str,
    pub nonce: String,
    pub ts: i64,
    pub version: u32,
}
