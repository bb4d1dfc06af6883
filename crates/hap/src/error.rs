use thiserror::Error;

use crate::characteristic::{CharacteristicType, CharacteristicValue};
use crate::service::ServiceKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HapError {
    #[error("Invalid value {1} for characteristic {0}")]
    InvalidValue(CharacteristicType, CharacteristicValue),

    #[error("Service {0} has no characteristic {1}")]
    UnknownCharacteristic(ServiceKind, CharacteristicType),

    #[error("Accessory already has a {0} service")]
    DuplicateService(ServiceKind),

    #[error("Accessory has no {0} service")]
    MissingService(ServiceKind),
}

pub type HapResult<T> = Result<T, HapError>;
