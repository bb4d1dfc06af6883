use thiserror::Error;

use crate::queue::QueueError;
use crate::service::ServiceError;

#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    SerdeYaml(#[from] serde_yml::Error),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    TungsteniteError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    MdnsSdError(#[from] mdns_sd::Error),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    #[error(transparent)]
    EwelinkError(#[from] ewelink::EwelinkError),

    #[error(transparent)]
    HapError(#[from] hap::HapError),

    #[error(transparent)]
    QueueError(#[from] QueueError),

    #[error(transparent)]
    ServiceTypeError(#[from] ServiceError),

    /* ewebridge errors */
    #[error("Connection not authenticated after {attempts} attempts")]
    NotAuthenticated { attempts: u32 },

    #[error("Real time monitoring is not supported by this connection")]
    MonitoringUnsupported,

    #[error("Device {0} not found")]
    DeviceNotFound(String),

    #[error("Invalid {key}: {value} (expected 1 to {max} seconds)")]
    InvalidInterval {
        key: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Platform task is no longer running")]
    PlatformGone,

    #[error("Service error: {0}")]
    ServiceError(String),
}

impl ApiError {
    #[must_use]
    pub fn service_error(msg: impl Into<String>) -> Self {
        Self::ServiceError(msg.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
