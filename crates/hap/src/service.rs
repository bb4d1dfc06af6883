use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::characteristic::{Characteristic, CharacteristicType, CharacteristicValue, Perm};
use crate::error::{HapError, HapResult};

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    AccessoryInformation,
    GarageDoorOpener,
    Switch,
}

impl ServiceKind {
    /// Characteristics every service of this kind carries.
    #[must_use]
    pub const fn required(self) -> &'static [CharacteristicType] {
        match self {
            Self::AccessoryInformation => &[
                CharacteristicType::Identify,
                CharacteristicType::Manufacturer,
                CharacteristicType::Model,
                CharacteristicType::Name,
                CharacteristicType::SerialNumber,
                CharacteristicType::FirmwareRevision,
            ],
            Self::GarageDoorOpener => &[
                CharacteristicType::Name,
                CharacteristicType::CurrentDoorState,
                CharacteristicType::TargetDoorState,
                CharacteristicType::ObstructionDetected,
            ],
            Self::Switch => &[CharacteristicType::Name, CharacteristicType::On],
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Service {
    pub kind: ServiceKind,
    pub characteristics: BTreeMap<CharacteristicType, Characteristic>,
}

impl Service {
    #[must_use]
    pub fn new(kind: ServiceKind, name: &str) -> Self {
        let mut characteristics = kind
            .required()
            .iter()
            .map(|ct| (*ct, Characteristic::new(*ct)))
            .collect::<BTreeMap<_, _>>();

        if let Some(ch) = characteristics.get_mut(&CharacteristicType::Name) {
            ch.value = CharacteristicValue::String(name.to_string());
            ch.set_perms([Perm::PairedRead]);
        }

        Self {
            kind,
            characteristics,
        }
    }

    #[must_use]
    pub fn get(&self, ctype: CharacteristicType) -> Option<&Characteristic> {
        self.characteristics.get(&ctype)
    }

    pub fn get_characteristic(&mut self, ctype: CharacteristicType) -> HapResult<&mut Characteristic> {
        let kind = self.kind;
        self.characteristics
            .get_mut(&ctype)
            .ok_or(HapError::UnknownCharacteristic(kind, ctype))
    }

    #[must_use]
    pub fn value(&self, ctype: CharacteristicType) -> Option<&CharacteristicValue> {
        self.get(ctype).map(|ch| &ch.value)
    }

    /// Set a characteristic value. Returns `self`, so calls can be chained.
    pub fn set_characteristic(
        &mut self,
        ctype: CharacteristicType,
        value: impl Into<CharacteristicValue>,
    ) -> HapResult<&mut Self> {
        self.get_characteristic(ctype)?.set_value(value.into())?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::characteristic::{CharacteristicType, CharacteristicValue, CurrentDoorState};
    use crate::error::HapError;
    use crate::service::{Service, ServiceKind};

    #[test]
    fn new_service_has_required_characteristics() {
        let svc = Service::new(ServiceKind::GarageDoorOpener, "Garage");

        for ct in ServiceKind::GarageDoorOpener.required() {
            assert!(svc.get(*ct).is_some(), "missing {ct}");
        }
        assert_eq!(
            svc.value(CharacteristicType::Name),
            Some(&CharacteristicValue::String("Garage".to_string()))
        );
    }

    #[test]
    fn set_characteristic_chains() {
        let mut svc = Service::new(ServiceKind::GarageDoorOpener, "Garage");

        svc.set_characteristic(CharacteristicType::TargetDoorState, CharacteristicValue::UInt8(0))
            .unwrap()
            .set_characteristic(CharacteristicType::CurrentDoorState, CurrentDoorState::Opening)
            .unwrap();

        assert_eq!(
            svc.value(CharacteristicType::CurrentDoorState),
            Some(&CharacteristicValue::UInt8(2))
        );
    }

    #[test]
    fn unknown_characteristic_is_an_error() {
        let mut svc = Service::new(ServiceKind::Switch, "Lamp");

        let err = svc
            .set_characteristic(CharacteristicType::TargetDoorState, CharacteristicValue::UInt8(0))
            .unwrap_err();
        assert!(matches!(
            err,
            HapError::UnknownCharacteristic(ServiceKind::Switch, CharacteristicType::TargetDoorState)
        ));
    }
}
