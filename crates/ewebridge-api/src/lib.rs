pub mod config;
pub mod platform;

pub use platform::{AccessoryUpdate, PlatformRequest};
