use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HapError, HapResult};

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CharacteristicType {
    CurrentDoorState,
    FirmwareRevision,
    Identify,
    Manufacturer,
    Model,
    Name,
    ObstructionDetected,
    On,
    SerialNumber,
    TargetDoorState,
}

impl CharacteristicType {
    #[must_use]
    pub const fn format(self) -> Format {
        match self {
            Self::Identify | Self::ObstructionDetected | Self::On => Format::Bool,
            Self::CurrentDoorState => Format::UInt8 { max: CurrentDoorState::Stopped as u8 },
            Self::TargetDoorState => Format::UInt8 { max: TargetDoorState::Closed as u8 },
            Self::FirmwareRevision
            | Self::Manufacturer
            | Self::Model
            | Self::Name
            | Self::SerialNumber => Format::String,
        }
    }

    #[must_use]
    pub fn default_value(self) -> CharacteristicValue {
        match self {
            Self::Identify | Self::ObstructionDetected | Self::On => CharacteristicValue::Bool(false),
            Self::CurrentDoorState => CurrentDoorState::Closed.into(),
            Self::TargetDoorState => TargetDoorState::Closed.into(),
            Self::FirmwareRevision
            | Self::Manufacturer
            | Self::Model
            | Self::Name
            | Self::SerialNumber => CharacteristicValue::String(String::new()),
        }
    }
}

impl fmt::Display for CharacteristicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Bool,
    UInt8 { max: u8 },
    String,
}

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Perm {
    #[serde(rename = "pr")]
    PairedRead,
    #[serde(rename = "pw")]
    PairedWrite,
    #[serde(rename = "ev")]
    Events,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    UInt8(u8),
    String(String),
}

impl CharacteristicValue {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(&self) -> Option<u8> {
        match self {
            Self::UInt8(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn conforms_to(&self, format: Format) -> bool {
        match (self, format) {
            (Self::Bool(_), Format::Bool) | (Self::String(_), Format::String) => true,
            (Self::UInt8(n), Format::UInt8 { max }) => *n <= max,
            _ => false,
        }
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::UInt8(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for CharacteristicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for CharacteristicValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CurrentDoorState {
    Open = 0,
    Closed = 1,
    Opening = 2,
    Closing = 3,
    Stopped = 4,
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TargetDoorState {
    Open = 0,
    Closed = 1,
}

impl From<CurrentDoorState> for CharacteristicValue {
    fn from(value: CurrentDoorState) -> Self {
        Self::UInt8(value as u8)
    }
}

impl From<TargetDoorState> for CharacteristicValue {
    fn from(value: TargetDoorState) -> Self {
        Self::UInt8(value as u8)
    }
}

impl TryFrom<&CharacteristicValue> for CurrentDoorState {
    type Error = HapError;

    fn try_from(value: &CharacteristicValue) -> HapResult<Self> {
        match value.as_u8() {
            Some(0) => Ok(Self::Open),
            Some(1) => Ok(Self::Closed),
            Some(2) => Ok(Self::Opening),
            Some(3) => Ok(Self::Closing),
            Some(4) => Ok(Self::Stopped),
            _ => Err(HapError::InvalidValue(
                CharacteristicType::CurrentDoorState,
                value.clone(),
            )),
        }
    }
}

impl TryFrom<&CharacteristicValue> for TargetDoorState {
    type Error = HapError;

    fn try_from(value: &CharacteristicValue) -> HapResult<Self> {
        match value.as_u8() {
            Some(0) => Ok(Self::Open),
            Some(1) => Ok(Self::Closed),
            _ => Err(HapError::InvalidValue(
                CharacteristicType::TargetDoorState,
                value.clone(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub ctype: CharacteristicType,
    pub value: CharacteristicValue,
    #[serde(default)]
    pub perms: BTreeSet<Perm>,
}

impl Characteristic {
    #[must_use]
    pub fn new(ctype: CharacteristicType) -> Self {
        Self {
            ctype,
            value: ctype.default_value(),
            perms: BTreeSet::new(),
        }
    }

    /// Store a new value, returning `true` if it differs from the old one.
    pub fn set_value(&mut self, value: CharacteristicValue) -> HapResult<bool> {
        if !value.conforms_to(self.ctype.format()) {
            return Err(HapError::InvalidValue(self.ctype, value));
        }
        if self.value == value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }

    pub fn set_perms(&mut self, perms: impl IntoIterator<Item = Perm>) {
        self.perms = perms.into_iter().collect();
    }

    #[must_use]
    pub fn readable(&self) -> bool {
        self.perms.contains(&Perm::PairedRead)
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.perms.contains(&Perm::PairedWrite)
    }
}
