use serde::{Deserialize, Serialize};

/// Requests delivered to the reconciler task.
///
/// Anything that would insert into or remove from the accessory cache is
/// expressed as a request, so the reconciler stays the only writer.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum PlatformRequest {
    /// Run a full reconciliation pass against the remote device registry.
    Reconcile,
    /// A targeted read reported the device as gone.
    RemoveAccessory(String),
    /// Close the push channel, stop the drain timer and perform a final drain.
    Shutdown,
}

/// Payload of the accessory update topics.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct AccessoryUpdate {
    pub device_id: String,
    pub server_state: String,
}

impl AccessoryUpdate {
    #[must_use]
    pub fn new(device_id: impl Into<String>, server_state: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            server_state: server_state.into(),
        }
    }
}
