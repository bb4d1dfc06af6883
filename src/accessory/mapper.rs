use ewelink::Device;

/// Canonical projection of a device, as used to build and refresh accessories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessoryInformation {
    pub id: String,
    pub name: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
    pub api_key: String,
    pub state: Option<String>,
}

impl From<Device> for AccessoryInformation {
    fn from(device: Device) -> Self {
        Self {
            id: device.device_id,
            name: device.name,
            serial_number: device.extra.extra.mac,
            manufacturer: device.product_model,
            model: device.extra.extra.model,
            firmware_revision: device.params.fw_version.unwrap_or_default(),
            api_key: device.api_key,
            state: device.params.switch,
        }
    }
}

/// Map a device fetch to accessory information.
///
/// A failed fetch yields `None`. This is different from an empty account,
/// and callers must not treat it as "every device is gone".
#[must_use]
pub fn map_devices_to_accessory_information(
    devices: Option<Vec<Device>>,
) -> Option<Vec<AccessoryInformation>> {
    let Some(devices) = devices else {
        log::warn!("No devices retrieved from eWeLink, check previous logs for any errors");
        return None;
    };

    log::info!("Retrieved {} devices from eWeLink", devices.len());
    for dev in &devices {
        log::debug!("  [{}] {} ({})", dev.device_id, dev.name, dev.product_model);
    }

    Some(devices.into_iter().map(AccessoryInformation::from).collect())
}
