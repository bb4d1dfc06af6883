use std::collections::BTreeMap;
use std::fs::File;
use std::io::ErrorKind;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use hap::Accessory;

use crate::error::ApiResult;

pub const PLUGIN_NAME: &str = "homebridge-ewelink-with-api";
pub const PLATFORM_NAME: &str = "EweLink";

/// Registration calls the platform makes on the home-automation host.
#[async_trait]
pub trait PlatformHost: Send + Sync {
    async fn register_platform_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<Accessory>,
    ) -> ApiResult<()>;

    async fn unregister_platform_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<Accessory>,
    ) -> ApiResult<()>;

    async fn update_platform_accessories(&self, accessories: Vec<Accessory>) -> ApiResult<()>;
}

/// Host that keeps registered accessories in a yaml file.
///
/// On startup, [`AccessoryStore::cached`] returns what was registered last
/// time, so the platform can restore accessories before reconciling.
pub struct AccessoryStore {
    path: Utf8PathBuf,
    accessories: Mutex<BTreeMap<Uuid, Accessory>>,
}

impl AccessoryStore {
    pub fn load(path: &Utf8Path) -> ApiResult<Self> {
        let accessories = match File::open(path) {
            Ok(fd) => {
                let list: Vec<Accessory> = serde_yml::from_reader(fd)?;
                log::debug!("Loaded {} cached accessories from {path}", list.len());
                list.into_iter().map(|acc| (acc.uuid, acc)).collect()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("No accessory cache at {path}, starting empty");
                BTreeMap::new()
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            accessories: Mutex::new(accessories),
        })
    }

    pub async fn cached(&self) -> Vec<Accessory> {
        self.accessories.lock().await.values().cloned().collect()
    }

    fn save(&self, accessories: &BTreeMap<Uuid, Accessory>) -> ApiResult<()> {
        let list: Vec<&Accessory> = accessories.values().collect();
        let file = File::create(&self.path)?;
        serde_yml::to_writer(file, &list)?;
        log::trace!("Saved {} accessories to {}", list.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl PlatformHost for AccessoryStore {
    async fn register_platform_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<Accessory>,
    ) -> ApiResult<()> {
        if accessories.is_empty() {
            return Ok(());
        }
        let mut lock = self.accessories.lock().await;
        for acc in accessories {
            log::info!("[{plugin}/{platform}] Registering accessory [{}]", acc.display_name);
            lock.insert(acc.uuid, acc);
        }
        self.save(&lock)
    }

    async fn unregister_platform_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<Accessory>,
    ) -> ApiResult<()> {
        if accessories.is_empty() {
            return Ok(());
        }
        let mut lock = self.accessories.lock().await;
        for acc in accessories {
            log::info!("[{plugin}/{platform}] Unregistering accessory [{}]", acc.display_name);
            lock.remove(&acc.uuid);
        }
        self.save(&lock)
    }

    async fn update_platform_accessories(&self, accessories: Vec<Accessory>) -> ApiResult<()> {
        let mut lock = self.accessories.lock().await;
        for acc in accessories {
            lock.insert(acc.uuid, acc);
        }
        self.save(&lock)
    }
}
