pub mod garage_door;
pub mod switch;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use ewebridge_api::PlatformRequest;
use ewelink::DeviceState;
use ewelink::cloud::ERROR_NOT_FOUND;
use hap::{
    Accessory, Category, CharacteristicType, CharacteristicValue, HapStatus, HapStatusResult, Perm,
    ServiceKind,
};

use crate::accessory::AccessoryRef;
use crate::coalescer::UpdateCoalescer;
use crate::connection::Connection;
use crate::error::ApiResult;

pub use garage_door::GarageDoor;
pub use switch::Switch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("No [{tag}] translation of {value} for characteristic {ctype}")]
    Translation {
        tag: &'static str,
        ctype: CharacteristicType,
        value: String,
    },

    #[error("Unknown service key [{0}]")]
    UnknownServiceKey(String),

    #[error("Characteristic {ctype} of [{tag}] cannot be set")]
    ReadOnly {
        tag: &'static str,
        ctype: CharacteristicType,
    },
}

impl ServiceError {
    #[must_use]
    pub fn translation(
        tag: &'static str,
        ctype: CharacteristicType,
        value: impl ToString,
    ) -> Self {
        Self::Translation {
            tag,
            ctype,
            value: value.to_string(),
        }
    }
}

/// Shared collaborators handed to every behavior object.
#[derive(Clone)]
pub struct ServiceContext {
    pub connection: Arc<dyn Connection>,
    pub coalescer: Arc<UpdateCoalescer>,
    pub requests: UnboundedSender<PlatformRequest>,
    pub door_travel_time: Duration,
}

/// Outcome of reading the device state before a get or set.
enum Lookup {
    State(String),
    Failed(HapStatus),
}

/// Behavior of one accessory category.
///
/// Implementations hold no per-accessory state. Everything specific to an
/// accessory lives in the [`Accessory`] itself.
#[async_trait]
pub trait ServiceType: Send + Sync {
    fn context(&self) -> &ServiceContext;

    /// Tag matched against device names, and stored on each accessory.
    fn service_tag(&self) -> &'static str;

    fn category(&self) -> Category;

    fn service_kind(&self) -> ServiceKind;

    /// Characteristics the host may set.
    fn editable_characteristics(&self) -> &'static [CharacteristicType];

    /// Characteristics the host may only read.
    fn readonly_characteristics(&self) -> &'static [CharacteristicType];

    fn translate_remote_state(
        &self,
        raw: &str,
        ctype: CharacteristicType,
    ) -> Result<CharacteristicValue, ServiceError>;

    fn translate_local_state(&self, value: &CharacteristicValue) -> Result<String, ServiceError>;

    /// Apply a raw state reported by the server to a characteristic.
    async fn set_characteristic(
        &self,
        accessory: &AccessoryRef,
        ctype: CharacteristicType,
        raw: &str,
    ) -> ApiResult<()>;

    /// Drive the device to `target`, and mirror the change locally.
    async fn update_accessory_states(
        &self,
        accessory: &AccessoryRef,
        target: CharacteristicValue,
    ) -> HapStatusResult<()>;

    fn add_accessory_to_service(&self, accessory: &mut Accessory) -> ApiResult<()> {
        log::info!(
            "[{}] Configuring as a {} service",
            accessory.display_name,
            self.service_kind()
        );
        let name = accessory.display_name.clone();
        accessory.add_service(self.service_kind(), &name)?;
        Ok(())
    }

    /// Set characteristic permissions, so the host knows which ones accept
    /// get and set requests.
    fn configure(&self, accessory: &mut Accessory) -> ApiResult<()> {
        let service = accessory.service_mut(self.service_kind())?;
        for ctype in self.editable_characteristics() {
            service
                .get_characteristic(*ctype)?
                .set_perms([Perm::PairedRead, Perm::PairedWrite, Perm::Events]);
        }
        for ctype in self.readonly_characteristics() {
            service
                .get_characteristic(*ctype)?
                .set_perms([Perm::PairedRead, Perm::Events]);
        }
        Ok(())
    }

    fn set_accessory_on_identify(&self, accessory: &mut Accessory) -> ApiResult<()> {
        accessory
            .information_mut()?
            .get_characteristic(CharacteristicType::Identify)?
            .set_perms([Perm::PairedWrite]);
        Ok(())
    }

    /// Identify is not supported by any device, so this only logs.
    fn identify(&self, accessory: &Accessory) {
        log::warn!("[{}] Identify not supported", accessory.display_name);
    }

    async fn get_server_state(
        &self,
        accessory: &AccessoryRef,
        ctype: CharacteristicType,
    ) -> HapStatusResult<CharacteristicValue> {
        let raw = match lookup_state(self.context(), accessory).await {
            Lookup::State(raw) => raw,
            Lookup::Failed(status) => return Err(status),
        };

        self.translate_remote_state(&raw, ctype).map_err(|err| {
            log::error!("{err}");
            HapStatus::ServiceCommunicationFailure
        })
    }

    async fn set_server_state(
        &self,
        accessory: &AccessoryRef,
        target: CharacteristicValue,
    ) -> HapStatusResult<()> {
        let name = accessory.lock().await.display_name.clone();
        let target_raw = self.translate_local_state(&target).map_err(|err| {
            log::error!("[{name}] {err}");
            HapStatus::InvalidValueInRequest
        })?;
        log::info!("[{name}] Requested device server state is [{target_raw}]");

        let raw = match lookup_state(self.context(), accessory).await {
            Lookup::State(raw) => raw,
            Lookup::Failed(status) => return Err(status),
        };

        if raw == target_raw {
            log::warn!("[{name}] Device already in requested state");
            return Ok(());
        }

        log::info!("[{name}] Device not in requested state, updating");
        self.update_accessory_states(accessory, target).await
    }
}

/// Read the current raw state of the device behind an accessory.
async fn lookup_state(ctx: &ServiceContext, accessory: &AccessoryRef) -> Lookup {
    let (device_id, name) = {
        let acc = accessory.lock().await;
        (acc.context.device_id.clone(), acc.display_name.clone())
    };
    log::info!("[{name}] Checking server side state");

    match ctx.connection.request_device_state(&device_id).await {
        None => {
            log::error!("[{name}] No device state found");
            Lookup::Failed(HapStatus::ServiceCommunicationFailure)
        }
        Some(DeviceState {
            error: Some(ERROR_NOT_FOUND),
            ..
        }) => {
            log::warn!("[{name}] Device no longer exists, removing accessory");
            if ctx
                .requests
                .send(PlatformRequest::RemoveAccessory(device_id))
                .is_err()
            {
                log::error!("[{name}] Platform is not running, cannot remove accessory");
            }
            Lookup::Failed(HapStatus::ResourceDoesNotExist)
        }
        Some(state) => match state.state {
            Some(raw) if !state.is_error() => {
                log::info!("[{name}] Device is in state [{raw}]");
                Lookup::State(raw)
            }
            _ => {
                log::error!(
                    "[{name}] Unable to retrieve state, DeviceState error: [{}] [{}]",
                    state.error.unwrap_or_default(),
                    state.msg.as_deref().unwrap_or_default()
                );
                Lookup::Failed(HapStatus::NotAllowedInCurrentState)
            }
        },
    }
}

/// Issue a state change on behalf of a host request.
///
/// Push updates for the device are held back for a short while, so the
/// device echoing the new state does not bounce the characteristic.
pub(crate) async fn command_device(ctx: &ServiceContext, device_id: &str, raw: &str) -> bool {
    ctx.coalescer.block_updates(device_id);
    match ctx.connection.attempt_set_device_state(device_id, raw).await {
        Some(state) if !state.is_error() => true,
        Some(state) => {
            log::error!(
                "[{device_id}] Device refused state [{raw}]: [{}] [{}]",
                state.error.unwrap_or_default(),
                state.msg.as_deref().unwrap_or_default()
            );
            false
        }
        None => false,
    }
}

/// Static registry of behavior objects, keyed by service tag.
pub struct ServiceMap {
    types: BTreeMap<&'static str, Arc<dyn ServiceType>>,
    /// Registry order, which decides ties when several tags match a name.
    order: Vec<&'static str>,
    default: Arc<dyn ServiceType>,
}

impl ServiceMap {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        let default: Arc<dyn ServiceType> = Arc::new(Switch::new(ctx.clone()));
        let registry: [Arc<dyn ServiceType>; 2] =
            [Arc::new(GarageDoor::new(ctx.clone())), default.clone()];

        let order = registry.iter().map(|st| st.service_tag()).collect();
        let types = registry
            .into_iter()
            .map(|st| (st.service_tag(), st))
            .collect();

        Self {
            types,
            order,
            default,
        }
    }

    /// Classify a device by name. Falls back to a switch.
    #[must_use]
    pub fn calculate_service_type(&self, name: &str) -> Arc<dyn ServiceType> {
        let lower = name.to_lowercase();
        for tag in &self.order {
            log::debug!("Checking accessory [{name}] against service key [{tag}]");
            if lower.contains(&tag.to_lowercase()) {
                log::debug!("Accessory [{name}] matched service [{tag}]");
                if let Some(st) = self.types.get(tag) {
                    return st.clone();
                }
            }
        }
        self.default.clone()
    }

    pub fn get_service_type(&self, key: &str) -> Result<Arc<dyn ServiceType>, ServiceError> {
        self.types
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownServiceKey(key.to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use ewebridge_api::PlatformRequest;

    use crate::coalescer::UpdateCoalescer;
    use crate::connection::Connection;
    use crate::service::{ServiceContext, ServiceError, ServiceMap};
    use crate::testutil::ScriptedConnection;

    pub fn context(
        connection: Arc<dyn Connection>,
    ) -> (ServiceContext, mpsc::UnboundedReceiver<PlatformRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ServiceContext {
            connection,
            coalescer: Arc::new(UpdateCoalescer::new()),
            requests: tx,
            door_travel_time: Duration::from_secs(20),
        };
        (ctx, rx)
    }

    fn service_map() -> ServiceMap {
        let (ctx, _rx) = context(Arc::new(ScriptedConnection::default()));
        ServiceMap::new(&ctx)
    }

    #[test]
    fn classify_by_name() {
        let map = service_map();

        assert_eq!(map.calculate_service_type("Garage").service_tag(), "garage");
        assert_eq!(map.calculate_service_type("BIG GARAGE door").service_tag(), "garage");
        assert_eq!(map.calculate_service_type("Kitchen Switch").service_tag(), "switch");
    }

    #[test]
    fn classify_defaults_to_switch() {
        let map = service_map();

        assert_eq!(map.calculate_service_type("Kitchen Lamp").service_tag(), "switch");
        assert_eq!(map.calculate_service_type("").service_tag(), "switch");
    }

    #[test]
    fn lookup_by_key() {
        let map = service_map();

        assert_eq!(map.get_service_type("garage").unwrap().service_tag(), "garage");
        assert_eq!(map.get_service_type("switch").unwrap().service_tag(), "switch");
        assert!(matches!(
            map.get_service_type("thermostat").err(),
            Some(ServiceError::UnknownServiceKey(key)) if key == "thermostat"
        ));
    }

    #[test]
    fn registry_order() {
        let map = service_map();
        assert_eq!(map.tags().collect::<Vec<_>>(), ["garage", "switch"]);
    }
}
