pub mod cloud;
pub mod device;
pub mod error;
pub mod lan;
pub mod sign;
pub mod socket;

pub use device::{Device, DeviceState};
pub use error::{EwelinkError, EwelinkResult};
pub use socket::SocketMessage;
