#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use ewebridge::config::AppConfig;
use ewebridge::connection::{Authentication, Connection};
use ewebridge::error::{ApiError, ApiResult};
use ewebridge::host::PlatformHost;
use ewebridge::platform::EweLinkPlatform;
use ewelink::{Device, DeviceState, SocketMessage};
use hap::Accessory;

pub fn device(id: &str, name: &str, state: &str) -> Device {
    serde_json::from_value(serde_json::json!({
        "deviceid": id,
        "name": name,
        "apikey": "key",
        "productModel": "Sonoff Basic",
        "params": {"switch": state, "fwVersion": "3.5.0"},
        "extra": {"extra": {"mac": format!("mac-{id}"), "model": "PSF-BFB-GL"}}
    }))
    .unwrap()
}

/// Connection backed by an in-memory device registry.
#[derive(Default)]
pub struct FakeConnection {
    devices: Mutex<Option<Vec<Device>>>,
    states: Mutex<HashMap<String, DeviceState>>,
    sink: Mutex<Option<UnboundedSender<SocketMessage>>>,
    push: bool,
    closed: Mutex<bool>,
}

impl FakeConnection {
    pub fn with_push() -> Self {
        Self {
            push: true,
            ..Self::default()
        }
    }

    /// Replace the registry. `None` simulates a failed fetch.
    pub fn set_devices(&self, devices: Option<Vec<Device>>) {
        let mut states = self.states.lock().unwrap();
        for dev in devices.iter().flatten() {
            if let Some(state) = dev.switch_state() {
                states.insert(dev.device_id.clone(), DeviceState::ok(state));
            }
        }
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_state(&self, id: &str, state: DeviceState) {
        self.states.lock().unwrap().insert(id.to_string(), state);
    }

    /// Deliver a push message, as the monitoring socket would.
    pub fn push(&self, message: SocketMessage) {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .expect("monitoring socket not open")
            .send(message)
            .unwrap();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn activate_connection(&self) -> Option<Authentication> {
        Some(Authentication::Lan {
            api_key: "key".to_string(),
        })
    }

    async fn request_devices(&self) -> Option<Vec<Device>> {
        self.devices.lock().unwrap().clone()
    }

    async fn request_device(&self, device_id: &str) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .find(|dev| dev.device_id == device_id)
            .cloned()
    }

    async fn request_device_state(&self, device_id: &str) -> Option<DeviceState> {
        self.states.lock().unwrap().get(device_id).cloned()
    }

    async fn attempt_set_device_state(&self, device_id: &str, state: &str) -> Option<DeviceState> {
        self.set_state(device_id, DeviceState::ok(state));
        Some(DeviceState::ok(state))
    }

    async fn open_monitoring_socket(&self, sink: UnboundedSender<SocketMessage>) -> ApiResult<()> {
        if !self.push {
            return Err(ApiError::MonitoringUnsupported);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn close_monitoring_socket(&self) {
        *self.closed.lock().unwrap() = true;
        self.sink.lock().unwrap().take();
    }
}

/// Host that records every registration call.
#[derive(Default)]
pub struct MemoryHost {
    pub registered: Mutex<Vec<String>>,
    pub unregistered: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<String>>,
    pub refused: Mutex<Vec<String>>,
}

fn ids(accessories: &[Accessory]) -> impl Iterator<Item = String> + '_ {
    accessories.iter().map(|acc| acc.context.device_id.clone())
}

impl MemoryHost {
    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }

    /// Fail registration of the given device until `accept` is called.
    pub fn refuse(&self, id: &str) {
        self.refused.lock().unwrap().push(id.to_string());
    }

    pub fn accept(&self, id: &str) {
        self.refused.lock().unwrap().retain(|refused| refused != id);
    }
}

#[async_trait]
impl PlatformHost for MemoryHost {
    async fn register_platform_accessories(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: Vec<Accessory>,
    ) -> ApiResult<()> {
        let refused = self.refused.lock().unwrap();
        if let Some(id) = ids(&accessories).find(|id| refused.contains(id)) {
            return Err(ApiError::service_error(format!("registration of {id} refused")));
        }
        drop(refused);
        self.registered.lock().unwrap().extend(ids(&accessories));
        Ok(())
    }

    async fn unregister_platform_accessories(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: Vec<Accessory>,
    ) -> ApiResult<()> {
        self.unregistered.lock().unwrap().extend(ids(&accessories));
        Ok(())
    }

    async fn update_platform_accessories(&self, accessories: Vec<Accessory>) -> ApiResult<()> {
        self.updated.lock().unwrap().extend(ids(&accessories));
        Ok(())
    }
}

pub struct Harness {
    pub platform: EweLinkPlatform,
    pub connection: Arc<FakeConnection>,
    pub host: Arc<MemoryHost>,
}

pub fn try_harness(config: AppConfig, connection: FakeConnection) -> ApiResult<Harness> {
    let connection = Arc::new(connection);
    let host = Arc::new(MemoryHost::default());
    let platform = EweLinkPlatform::new(config, connection.clone(), host.clone())?;
    Ok(Harness {
        platform,
        connection,
        host,
    })
}

pub fn harness(config: AppConfig, connection: FakeConnection) -> Harness {
    try_harness(config, connection).unwrap()
}

pub fn push_config() -> AppConfig {
    AppConfig {
        real_time_update: true,
        real_time_tolerance_window: 5,
        ..AppConfig::default()
    }
}
