use thiserror::Error;

/// Status codes returned to the host for characteristic requests.
#[derive(Error, Copy, Debug, Clone, PartialEq, Eq)]
pub enum HapStatus {
    #[error("Request denied due to insufficient privileges")]
    InsufficientPrivileges,
    #[error("Unable to communicate with requested service")]
    ServiceCommunicationFailure,
    #[error("Resource is busy, try again")]
    ResourceBusy,
    #[error("Cannot write to read only characteristic")]
    ReadOnlyCharacteristic,
    #[error("Cannot read from a write only characteristic")]
    WriteOnlyCharacteristic,
    #[error("Operation timed out")]
    OperationTimedOut,
    #[error("Resource does not exist")]
    ResourceDoesNotExist,
    #[error("Accessory received an invalid value in a write request")]
    InvalidValueInRequest,
    #[error("Operation not allowed in current state")]
    NotAllowedInCurrentState,
}

impl HapStatus {
    pub const SUCCESS: i32 = 0;

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::InsufficientPrivileges => -70401,
            Self::ServiceCommunicationFailure => -70402,
            Self::ResourceBusy => -70403,
            Self::ReadOnlyCharacteristic => -70404,
            Self::WriteOnlyCharacteristic => -70405,
            Self::OperationTimedOut => -70408,
            Self::ResourceDoesNotExist => -70409,
            Self::InvalidValueInRequest => -70410,
            Self::NotAllowedInCurrentState => -70412,
        }
    }
}

pub type HapStatusResult<T> = Result<T, HapStatus>;
