use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use ewelink::{Device, DeviceState, SocketMessage};
use hap::{Accessory, AccessoryContext, generate_uuid};

use crate::accessory::AccessoryRef;
use crate::connection::{Authentication, Connection};
use crate::error::{ApiError, ApiResult};
use crate::service::ServiceType;

/// In-memory connection with scripted device states.
#[derive(Default)]
pub struct ScriptedConnection {
    states: Mutex<HashMap<String, DeviceState>>,
    commands: Mutex<Vec<(String, String)>>,
    fail_commands: AtomicBool,
}

impl ScriptedConnection {
    pub fn set_state(&self, id: &str, state: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(id.to_string(), DeviceState::ok(state));
    }

    pub fn set_state_error(&self, id: &str, code: i64) {
        self.states
            .lock()
            .unwrap()
            .insert(id.to_string(), DeviceState::failed(code, "scripted failure"));
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn activate_connection(&self) -> Option<Authentication> {
        Some(Authentication::Lan {
            api_key: "test".to_string(),
        })
    }

    async fn request_devices(&self) -> Option<Vec<Device>> {
        None
    }

    async fn request_device(&self, _device_id: &str) -> Option<Device> {
        None
    }

    async fn request_device_state(&self, device_id: &str) -> Option<DeviceState> {
        self.states.lock().unwrap().get(device_id).cloned()
    }

    async fn attempt_set_device_state(&self, device_id: &str, state: &str) -> Option<DeviceState> {
        self.commands
            .lock()
            .unwrap()
            .push((device_id.to_string(), state.to_string()));
        if self.fail_commands.load(Ordering::SeqCst) {
            return None;
        }
        self.set_state(device_id, state);
        Some(DeviceState::ok(state))
    }

    async fn open_monitoring_socket(&self, _sink: UnboundedSender<SocketMessage>) -> ApiResult<()> {
        Err(ApiError::MonitoringUnsupported)
    }

    async fn close_monitoring_socket(&self) {}
}

/// Accessory set up the way the platform would for a new device.
pub fn accessory_for(service: &dyn ServiceType, id: &str, name: &str) -> AccessoryRef {
    let mut acc = Accessory::new(name, generate_uuid(id), service.category());
    acc.context = AccessoryContext {
        device_id: id.to_string(),
        api_key: "key".to_string(),
        device_service_key: service.service_tag().to_string(),
    };
    service.add_accessory_to_service(&mut acc).unwrap();
    service.set_accessory_on_identify(&mut acc).unwrap();
    service.configure(&mut acc).unwrap();
    Arc::new(tokio::sync::Mutex::new(acc))
}
