pub mod mapper;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use ewebridge_api::AccessoryUpdate;
use hap::{Accessory, AccessoryContext, CharacteristicType, generate_uuid};

use crate::error::ApiResult;
use crate::queue::TopicHandler;
use crate::service::{ServiceError, ServiceMap, ServiceType};

pub use mapper::AccessoryInformation;

pub type AccessoryRef = Arc<Mutex<Accessory>>;

/// Split of remote device ids against cached accessory ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    /// Remote ids without a cached accessory.
    pub new: Vec<String>,
    /// Ids present on both sides.
    pub existing: Vec<String>,
    /// Cached ids missing from the remote list.
    pub stale: Vec<String>,
}

/// Partition remote ids against the cached ones. Duplicate remote ids are
/// only counted once.
#[must_use]
pub fn determine_existence<'a>(
    remote: impl IntoIterator<Item = &'a str>,
    cached: &BTreeSet<String>,
) -> Partition {
    let mut part = Partition::default();
    let mut seen = BTreeSet::new();

    for id in remote {
        if !seen.insert(id) {
            continue;
        }
        if cached.contains(id) {
            part.existing.push(id.to_string());
        } else {
            part.new.push(id.to_string());
        }
    }

    part.stale = cached
        .iter()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();

    part
}

/// Owner of the accessory cache.
///
/// Only the platform task inserts or removes entries. Everyone else gets
/// shared references to individual accessories.
pub struct AccessoryService {
    accessories: RwLock<BTreeMap<String, AccessoryRef>>,
    services: ServiceMap,
}

impl AccessoryService {
    #[must_use]
    pub fn new(services: ServiceMap) -> Self {
        Self {
            accessories: RwLock::new(BTreeMap::new()),
            services,
        }
    }

    pub async fn get(&self, device_id: &str) -> Option<AccessoryRef> {
        self.accessories.read().await.get(device_id).cloned()
    }

    pub async fn ids(&self) -> BTreeSet<String> {
        self.accessories.read().await.keys().cloned().collect()
    }

    pub async fn determine_existence(&self, remote_ids: &[String]) -> Partition {
        determine_existence(remote_ids.iter().map(String::as_str), &self.ids().await)
    }

    /// Behavior object bound to an accessory through its stored service key.
    pub fn service_type(&self, accessory: &Accessory) -> Result<Arc<dyn ServiceType>, ServiceError> {
        self.services
            .get_service_type(&accessory.context.device_service_key)
    }

    pub fn configure_identify(&self, accessory: &mut Accessory) -> ApiResult<()> {
        self.service_type(accessory)?.set_accessory_on_identify(accessory)
    }

    pub fn configure_service(&self, accessory: &mut Accessory) -> ApiResult<()> {
        self.service_type(accessory)?.configure(accessory)
    }

    /// Build a new accessory for a device. The accessory is not cached yet.
    pub fn create_accessory(&self, info: &AccessoryInformation) -> ApiResult<Accessory> {
        log::info!(
            "Found Accessory with Name: [{}], Manufacturer: [{}], API Key: [{}]",
            info.name,
            info.manufacturer,
            info.api_key
        );
        let service = self.services.calculate_service_type(&info.name);

        let mut accessory = Accessory::new(&info.name, generate_uuid(&info.id), service.category());
        accessory.context = AccessoryContext {
            device_id: info.id.clone(),
            api_key: info.api_key.clone(),
            device_service_key: service.service_tag().to_string(),
        };

        service.add_accessory_to_service(&mut accessory)?;
        self.configure_identify(&mut accessory)?;
        self.configure_service(&mut accessory)?;
        apply_information(info, &mut accessory)?;
        Ok(accessory)
    }

    pub async fn save_accessory(&self, accessory: Accessory) -> AccessoryRef {
        let id = accessory.context.device_id.clone();
        let acc = Arc::new(Mutex::new(accessory));
        self.accessories.write().await.insert(id, acc.clone());
        acc
    }

    pub async fn remove_accessory(&self, device_id: &str) -> Option<AccessoryRef> {
        let acc = self.accessories.write().await.remove(device_id)?;
        log::warn!("Removing accessory [{}]", acc.lock().await.display_name);
        Some(acc)
    }

    pub async fn update_accessory_information(&self, info: &AccessoryInformation) -> ApiResult<()> {
        let Some(acc) = self.get(&info.id).await else {
            log::warn!("[{}] Cannot update information, accessory is not cached", info.name);
            return Ok(());
        };
        log::debug!("[{}] Device already configured, updating information", info.name);
        apply_information(info, &mut *acc.lock().await)
    }

    /// Push a raw server state through the accessory's behavior object.
    pub async fn update_accessory_state(&self, device_id: &str, state: &str) -> ApiResult<()> {
        let Some(acc) = self.get(device_id).await else {
            log::warn!("[{device_id}] Update for unknown accessory ignored");
            return Ok(());
        };

        let service = self.service_type(&*acc.lock().await)?;
        for ctype in service.editable_characteristics() {
            service.set_characteristic(&acc, *ctype, state).await?;
        }
        Ok(())
    }
}

fn apply_information(info: &AccessoryInformation, accessory: &mut Accessory) -> ApiResult<()> {
    accessory
        .information_mut()?
        .set_characteristic(CharacteristicType::Name, info.name.as_str())?
        .set_characteristic(CharacteristicType::SerialNumber, info.serial_number.as_str())?
        .set_characteristic(CharacteristicType::Manufacturer, info.manufacturer.as_str())?
        .set_characteristic(CharacteristicType::Model, info.model.as_str())?
        .set_characteristic(
            CharacteristicType::FirmwareRevision,
            info.firmware_revision.as_str(),
        )?;
    Ok(())
}

#[async_trait]
impl TopicHandler<AccessoryUpdate> for AccessoryService {
    async fn handle_message(&self, message: AccessoryUpdate) -> ApiResult<()> {
        self.update_accessory_state(&message.device_id, &message.server_state)
            .await
    }
}
