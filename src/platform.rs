use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use ewebridge_api::config::AppConfig;
use ewebridge_api::{AccessoryUpdate, PlatformRequest};
use ewelink::SocketMessage;
use hap::{Accessory, CharacteristicType, CharacteristicValue, HapStatus, HapStatusResult};

use crate::accessory::mapper::map_devices_to_accessory_information;
use crate::accessory::{AccessoryInformation, AccessoryRef, AccessoryService};
use crate::coalescer::UpdateCoalescer;
use crate::connection::Connection;
use crate::error::{ApiError, ApiResult};
use crate::host::{PLATFORM_NAME, PLUGIN_NAME, PlatformHost};
use crate::queue::{Queue, QueueError, QueueHandler, Topic};
use crate::service::{ServiceContext, ServiceMap, ServiceType};

/// The accessory reconciler.
///
/// Owns the accessory cache, and is the only task that adds or removes
/// cached accessories. Host requests come in through a [`PlatformHandle`].
pub struct EweLinkPlatform {
    config: AppConfig,
    connection: Arc<dyn Connection>,
    coalescer: Arc<UpdateCoalescer>,
    queue: Arc<Queue<AccessoryUpdate>>,
    handler: QueueHandler<AccessoryUpdate>,
    accessories: Arc<AccessoryService>,
    host: Arc<dyn PlatformHost>,
    requests: UnboundedSender<PlatformRequest>,
    inbox: UnboundedReceiver<PlatformRequest>,
    forwarder: Option<JoinHandle<()>>,
    push_active: bool,
}

impl EweLinkPlatform {
    pub fn new(
        config: AppConfig,
        connection: Arc<dyn Connection>,
        host: Arc<dyn PlatformHost>,
    ) -> ApiResult<Self> {
        crate::config::validate(&config)?;

        let (requests, inbox) = mpsc::unbounded_channel();
        let coalescer = Arc::new(UpdateCoalescer::new());

        let ctx = ServiceContext {
            connection: connection.clone(),
            coalescer: coalescer.clone(),
            requests: requests.clone(),
            door_travel_time: config.door_travel_time(),
        };
        let accessories = Arc::new(AccessoryService::new(ServiceMap::new(&ctx)));

        let queue = Arc::new(Queue::new());
        let mut handler = QueueHandler::new(queue.clone());
        handler.register_topic(Topic::PlatformUpdate, accessories.clone())?;
        if config.real_time_update {
            handler.register_topic(Topic::ServerUpdate, accessories.clone())?;
        }

        log::info!("[{}] Platform initialized", config.name);

        Ok(Self {
            config,
            connection,
            coalescer,
            queue,
            handler,
            accessories,
            host,
            requests,
            inbox,
            forwarder: None,
            push_active: false,
        })
    }

    #[must_use]
    pub fn handle(&self) -> PlatformHandle {
        PlatformHandle {
            accessories: self.accessories.clone(),
            requests: self.requests.clone(),
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &Arc<Queue<AccessoryUpdate>> {
        &self.queue
    }

    /// Restore an accessory persisted by the host.
    ///
    /// The accessory keeps the service key it was created with, even if the
    /// device has been renamed since.
    pub async fn configure_accessory(&self, mut accessory: Accessory) -> ApiResult<()> {
        log::info!(
            "[{}] Restoring cached accessory as [{}]",
            accessory.display_name,
            accessory.context.device_service_key
        );
        self.accessories.configure_identify(&mut accessory)?;
        self.accessories.configure_service(&mut accessory)?;
        self.accessories.save_accessory(accessory).await;
        Ok(())
    }

    /// Initial reconciliation, followed by opening the push channel when
    /// real time updates are enabled.
    pub async fn did_finish_launching(&mut self) -> ApiResult<()> {
        if let Err(err) = self.reconcile().await {
            log::error!("Initial reconciliation failed: {err}");
        }

        if !self.config.real_time_update {
            log::info!(
                "Real time updates disabled, polling every {:?}",
                self.config.poll_interval()
            );
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match self.connection.open_monitoring_socket(tx).await {
            Ok(()) => {
                self.forwarder = Some(self.spawn_forwarder(rx));
                self.push_active = true;
                log::info!("Real time updates enabled");
            }
            Err(err) => {
                log::warn!("Unable to open monitoring socket ({err}), falling back to polling");
            }
        }
        Ok(())
    }

    /// Route push messages through the coalescer into the server update topic.
    fn spawn_forwarder(&self, mut rx: UnboundedReceiver<SocketMessage>) -> JoinHandle<()> {
        let coalescer = self.coalescer.clone();
        let queue = self.queue.clone();
        let tolerance = self.config.tolerance_window();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let queue = queue.clone();
                coalescer.handle_incoming(tolerance, message, move |settled| {
                    enqueue_server_update(&queue, &settled);
                });
            }
            log::debug!("Monitoring socket closed, forwarder exiting");
        })
    }

    /// One full pass against the remote device registry.
    pub async fn reconcile(&self) -> ApiResult<()> {
        if self.connection.activate_connection().await.is_none() {
            log::error!("Connection could not be activated, skipping reconciliation");
            return Ok(());
        }

        let devices = self.connection.request_devices().await;
        let Some(infos) = map_devices_to_accessory_information(devices) else {
            log::warn!("Device fetch failed, leaving accessories untouched");
            return Ok(());
        };

        let mut by_id: BTreeMap<&str, &AccessoryInformation> = BTreeMap::new();
        for info in &infos {
            by_id.entry(info.id.as_str()).or_insert(info);
        }
        let remote_ids = by_id.keys().map(ToString::to_string).collect_vec();
        let part = self.accessories.determine_existence(&remote_ids).await;

        log::info!(
            "Reconciling: {} new, {} existing, {} stale",
            part.new.len(),
            part.existing.len(),
            part.stale.len()
        );

        for info in part.new.iter().filter_map(|id| by_id.get(id.as_str())) {
            if let Err(err) = self.add_device(info).await {
                log::error!("[{}] Failed to add accessory: {err}", info.name);
            }
        }

        for id in &part.stale {
            self.remove_device(id).await?;
        }

        let mut existing = vec![];
        for info in part.existing.iter().filter_map(|id| by_id.get(id.as_str())) {
            self.accessories.update_accessory_information(info).await?;
            if let Some(state) = &info.state {
                self.queue
                    .push(Topic::PlatformUpdate, AccessoryUpdate::new(&info.id, state))?;
            }
            if let Some(acc) = self.accessories.get(&info.id).await {
                existing.push(acc);
            }
        }

        self.drain().await?;

        self.host
            .update_platform_accessories(snapshot(&existing).await)
            .await
    }

    /// Create, register and cache one new accessory.
    ///
    /// The accessory is only cached once the host has accepted it, so a
    /// failure leaves the device "new" for the next pass.
    async fn add_device(&self, info: &AccessoryInformation) -> ApiResult<()> {
        let accessory = self.accessories.create_accessory(info)?;
        self.host
            .register_platform_accessories(PLUGIN_NAME, PLATFORM_NAME, vec![accessory.clone()])
            .await?;
        self.accessories.save_accessory(accessory).await;
        Ok(())
    }

    /// Drop an accessory from the cache and the host.
    pub async fn remove_device(&self, device_id: &str) -> ApiResult<()> {
        let Some(acc) = self.accessories.remove_accessory(device_id).await else {
            log::debug!("[{device_id}] Accessory already removed");
            return Ok(());
        };
        let accessory = acc.lock().await.clone();
        self.host
            .unregister_platform_accessories(PLUGIN_NAME, PLATFORM_NAME, vec![accessory])
            .await
    }

    /// Deliver every queued update.
    pub async fn drain(&self) -> ApiResult<usize> {
        let count = self.handler.process_queue().await?;
        if count > 0 {
            log::debug!("Drained {count} queued updates");
        }
        Ok(count)
    }

    /// Close the push channel and deliver whatever is still queued.
    pub async fn shutdown(&mut self) -> ApiResult<()> {
        log::info!("[{}] Shutting down", self.config.name);

        if self.push_active {
            self.connection.close_monitoring_socket().await;
            self.push_active = false;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        let flushed = self.coalescer.flush();
        if flushed > 0 {
            log::debug!("Flushed {flushed} pending push updates");
        }

        self.drain().await?;
        Ok(())
    }

    /// Main loop: drain on a timer, poll when there is no push channel, and
    /// serve requests until shutdown.
    pub async fn run(mut self) -> ApiResult<()> {
        let drain_every = self.config.drain_interval();
        let mut drain = tokio::time::interval_at(Instant::now() + drain_every, drain_every);
        drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll_every = self.config.poll_interval();
        let mut poll = tokio::time::interval_at(Instant::now() + poll_every, poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = drain.tick() => {
                    if let Err(err) = self.drain().await {
                        check_drain_error(err)?;
                    }
                }
                _ = poll.tick(), if !self.push_active => {
                    if let Err(err) = self.reconcile().await {
                        log::error!("Scheduled reconciliation failed: {err}");
                    }
                }
                req = self.inbox.recv() => match req {
                    Some(PlatformRequest::Reconcile) => {
                        if let Err(err) = self.reconcile().await {
                            log::error!("Requested reconciliation failed: {err}");
                        }
                    }
                    Some(PlatformRequest::RemoveAccessory(id)) => {
                        if let Err(err) = self.remove_device(&id).await {
                            log::error!("[{id}] Failed to remove accessory: {err}");
                        }
                    }
                    Some(PlatformRequest::Shutdown) | None => break,
                },
            }
        }

        self.shutdown().await
    }
}

/// An unknown topic means the queue was wired up wrong. Anything else only
/// affects the current pass.
fn check_drain_error(err: ApiError) -> ApiResult<()> {
    match err {
        ApiError::QueueError(QueueError::UnknownTopic(_)) => Err(err),
        err => {
            log::error!("Queue drain failed: {err}");
            Ok(())
        }
    }
}

fn enqueue_server_update(queue: &Queue<AccessoryUpdate>, message: &SocketMessage) {
    let (Some(device_id), Some(state)) = (&message.deviceid, message.switch_state()) else {
        log::trace!("Settled message without state ignored: {message:?}");
        return;
    };
    if let Err(err) = queue.push(Topic::ServerUpdate, AccessoryUpdate::new(device_id, state)) {
        log::error!("[{device_id}] Failed to queue server update: {err}");
    }
}

async fn snapshot(accessories: &[AccessoryRef]) -> Vec<Accessory> {
    let mut res = Vec::with_capacity(accessories.len());
    for acc in accessories {
        res.push(acc.lock().await.clone());
    }
    res
}

/// Host-side entry point for characteristic requests and lifecycle events.
#[derive(Clone)]
pub struct PlatformHandle {
    accessories: Arc<AccessoryService>,
    requests: UnboundedSender<PlatformRequest>,
}

impl PlatformHandle {
    async fn resolve(&self, device_id: &str) -> HapStatusResult<(AccessoryRef, Arc<dyn ServiceType>)> {
        let Some(acc) = self.accessories.get(device_id).await else {
            log::warn!("[{device_id}] Request for unknown accessory");
            return Err(HapStatus::ResourceDoesNotExist);
        };
        let service = self
            .accessories
            .service_type(&*acc.lock().await)
            .map_err(|err| {
                log::error!("[{device_id}] {err}");
                HapStatus::ServiceCommunicationFailure
            })?;
        Ok((acc, service))
    }

    /// Snapshot of a cached accessory.
    pub async fn accessory(&self, device_id: &str) -> Option<Accessory> {
        Some(self.accessories.get(device_id).await?.lock().await.clone())
    }

    pub async fn get_characteristic(
        &self,
        device_id: &str,
        ctype: CharacteristicType,
    ) -> HapStatusResult<CharacteristicValue> {
        let (acc, service) = self.resolve(device_id).await?;
        {
            let lock = acc.lock().await;
            let chr = lock
                .get_service(service.service_kind())
                .and_then(|svc| svc.get(ctype))
                .ok_or(HapStatus::ResourceDoesNotExist)?;
            if !chr.readable() {
                return Err(HapStatus::WriteOnlyCharacteristic);
            }
        }
        service.get_server_state(&acc, ctype).await
    }

    pub async fn set_characteristic(
        &self,
        device_id: &str,
        ctype: CharacteristicType,
        value: CharacteristicValue,
    ) -> HapStatusResult<()> {
        let (acc, service) = self.resolve(device_id).await?;
        {
            let lock = acc.lock().await;
            let chr = lock
                .get_service(service.service_kind())
                .and_then(|svc| svc.get(ctype))
                .ok_or(HapStatus::ResourceDoesNotExist)?;
            if !chr.writable() || !service.editable_characteristics().contains(&ctype) {
                log::warn!("[{}] Refusing write to read-only {ctype}", lock.display_name);
                return Err(HapStatus::ReadOnlyCharacteristic);
            }
        }
        service.set_server_state(&acc, value).await
    }

    pub async fn identify(&self, device_id: &str) -> HapStatusResult<()> {
        let (acc, service) = self.resolve(device_id).await?;
        service.identify(&*acc.lock().await);
        Ok(())
    }

    pub fn reconcile(&self) -> ApiResult<()> {
        self.send(PlatformRequest::Reconcile)
    }

    pub fn shutdown(&self) -> ApiResult<()> {
        self.send(PlatformRequest::Shutdown)
    }

    fn send(&self, req: PlatformRequest) -> ApiResult<()> {
        self.requests.send(req).map_err(|_| ApiError::PlatformGone)
    }
}
