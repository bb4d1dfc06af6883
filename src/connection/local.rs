use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;

use ewelink::cloud::ERROR_NOT_FOUND;
use ewelink::lan::{self, LanReply, LanRequest};
use ewelink::{Device, DeviceState, SocketMessage, sign};

use crate::connection::{Authentication, Connection, absorb};
use crate::error::{ApiError, ApiResult};

const TRANSPORT: &str = "local";

type AddressMap = BTreeMap<String, SocketAddr>;

/// Connection to devices in LAN mode, found through mDNS.
pub struct LocalConnection {
    http: reqwest::Client,
    api_key: String,
    /// Addresses as announced, updated by the discovery task.
    discovered: Arc<Mutex<AddressMap>>,
    /// Snapshot of `discovered`, taken on every full device fetch.
    addresses: RwLock<AddressMap>,
    daemon: Mutex<Option<ServiceDaemon>>,
    discovery: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalConnection {
    const DEFAULT_TIMEOUT_SECS: u64 = 5;

    pub fn new() -> ApiResult<Self> {
        Self::build(AddressMap::new(), true)
    }

    /// Connection with a fixed set of device addresses, and no discovery.
    pub fn with_addresses(
        addresses: impl IntoIterator<Item = (String, SocketAddr)>,
    ) -> ApiResult<Self> {
        Self::build(addresses.into_iter().collect(), false)
    }

    fn build(addresses: AddressMap, discovery: bool) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            api_key: sign::self_api_key(),
            discovered: Arc::new(Mutex::new(addresses)),
            addresses: RwLock::new(AddressMap::new()),
            daemon: Mutex::new(None),
            discovery,
        })
    }

    fn start_discovery(&self) -> ApiResult<()> {
        let mut daemon = lock(&self.daemon);
        if daemon.is_some() {
            return Ok(());
        }

        log::info!("[lan] Starting local device discovery");
        let mdns = ServiceDaemon::new()?;
        let receiver = mdns.browse(lan::SERVICE_TYPE)?;
        let discovered = self.discovered.clone();

        tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                record_event(&discovered, event);
            }
            log::debug!("[lan] Discovery stopped");
        });

        *daemon = Some(mdns);
        Ok(())
    }

    /// Take a fresh snapshot of the discovered addresses.
    async fn refresh_device_map(&self) -> Vec<String> {
        let snapshot = lock(&self.discovered).clone();
        let ids = snapshot.keys().cloned().collect();
        *self.addresses.write().await = snapshot;
        ids
    }

    async fn address(&self, device_id: &str) -> Option<SocketAddr> {
        if let Some(addr) = self.addresses.read().await.get(device_id) {
            return Some(*addr);
        }
        lock(&self.discovered).get(device_id).copied()
    }

    async fn zeroconf(&self, addr: SocketAddr, path: &str, body: &LanRequest) -> ApiResult<LanReply> {
        let response = self
            .http
            .post(format!("http://{addr}{path}"))
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn device_info(&self, device_id: &str) -> ApiResult<Device> {
        let addr = self
            .address(device_id)
            .await
            .ok_or_else(|| ApiError::DeviceNotFound(device_id.to_string()))?;

        let reply = self
            .zeroconf(addr, lan::INFO_PATH, &LanRequest::info(device_id))
            .await?;

        Ok(reply.into_info()?.into_device(device_id))
    }

    async fn fetch_devices(&self) -> ApiResult<Vec<Device>> {
        let ids = self.refresh_device_map().await;
        log::debug!("[lan] Querying {} discovered devices", ids.len());

        join_all(ids.iter().map(|id| self.device_info(id)))
            .await
            .into_iter()
            .collect()
    }

    async fn fetch_state(&self, device_id: &str) -> ApiResult<DeviceState> {
        match self.device_info(device_id).await {
            Ok(dev) => Ok(DeviceState {
                state: dev.params.switch,
                error: Some(0),
                msg: None,
            }),
            Err(ApiError::DeviceNotFound(id)) => Ok(DeviceState::failed(
                ERROR_NOT_FOUND,
                format!("device {id} has not been discovered"),
            )),
            Err(err) => Err(err),
        }
    }

    async fn send_state(&self, device_id: &str, state: &str) -> ApiResult<DeviceState> {
        let Some(addr) = self.address(device_id).await else {
            return Ok(DeviceState::failed(
                ERROR_NOT_FOUND,
                format!("device {device_id} has not been discovered"),
            ));
        };

        let reply = self
            .zeroconf(addr, lan::SWITCH_PATH, &LanRequest::switch(device_id, state))
            .await?;

        if reply.error == 0 {
            Ok(DeviceState::ok(state))
        } else {
            Ok(DeviceState::failed(reply.error, "device rejected switch request"))
        }
    }
}

fn record_event(discovered: &Mutex<AddressMap>, event: ServiceEvent) {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let Some(device_id) = lan::device_id_from_name(info.get_fullname()) else {
                log::debug!("[lan] Ignoring service {}", info.get_fullname());
                return;
            };
            let Some(ip) = info
                .get_addresses()
                .iter()
                .find(|ip| matches!(ip, IpAddr::V4(_)))
                .or_else(|| info.get_addresses().iter().next())
            else {
                log::warn!("[lan] Device [{device_id}] announced without an address");
                return;
            };
            let addr = SocketAddr::new(*ip, info.get_port());
            log::info!("[lan] Local device discovered: [{device_id}] at {addr}");
            lock(discovered).insert(device_id.to_string(), addr);
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            if let Some(device_id) = lan::device_id_from_name(&fullname) {
                log::info!("[lan] Local device removed: [{device_id}]");
                lock(discovered).remove(device_id);
            }
        }
        _ => {}
    }
}

#[async_trait]
impl Connection for LocalConnection {
    async fn activate_connection(&self) -> Option<Authentication> {
        if self.discovery {
            absorb(TRANSPORT, "activateConnection", async { self.start_discovery() }).await?;
        }
        Some(Authentication::Lan {
            api_key: self.api_key.clone(),
        })
    }

    async fn request_devices(&self) -> Option<Vec<Device>> {
        absorb(TRANSPORT, "requestDevices", self.fetch_devices()).await
    }

    async fn request_device(&self, device_id: &str) -> Option<Device> {
        absorb(TRANSPORT, "requestDevice", self.device_info(device_id)).await
    }

    async fn request_device_state(&self, device_id: &str) -> Option<DeviceState> {
        absorb(TRANSPORT, "requestDeviceState", self.fetch_state(device_id)).await
    }

    async fn attempt_set_device_state(&self, device_id: &str, state: &str) -> Option<DeviceState> {
        absorb(
            TRANSPORT,
            "attemptSetDeviceState",
            self.send_state(device_id, state),
        )
        .await
    }

    async fn open_monitoring_socket(&self, _sink: UnboundedSender<SocketMessage>) -> ApiResult<()> {
        Err(ApiError::MonitoringUnsupported)
    }

    async fn close_monitoring_socket(&self) {}
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        if let Some(daemon) = lock(&self.daemon).take() {
            let _ = daemon.shutdown();
        }
    }
}
