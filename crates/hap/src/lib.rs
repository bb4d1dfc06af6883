pub mod accessory;
pub mod characteristic;
pub mod error;
pub mod service;
pub mod status;

pub use accessory::{Accessory, AccessoryContext, Category, generate_uuid};
pub use characteristic::{
    Characteristic, CharacteristicType, CharacteristicValue, CurrentDoorState, Perm,
    TargetDoorState,
};
pub use error::{HapError, HapResult};
pub use service::{Service, ServiceKind};
pub use status::{HapStatus, HapStatusResult};
