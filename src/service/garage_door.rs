use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use hap::{
    Category, CharacteristicType, CharacteristicValue, CurrentDoorState, HapStatus,
    HapStatusResult, ServiceKind, TargetDoorState,
};

use crate::accessory::AccessoryRef;
use crate::error::ApiResult;
use crate::service::{ServiceContext, ServiceError, ServiceType, command_device};

/// Raw state of an open door. The relay is on while the door is open.
const OPEN: &str = "on";
const CLOSED: &str = "off";

/// Latest trip number per device. An arrival timer only settles the door if
/// no newer trip has started since it was scheduled.
type Trips = Arc<Mutex<HashMap<String, u64>>>;

pub struct GarageDoor {
    ctx: ServiceContext,
    trips: Trips,
}

fn next_trip(trips: &Trips, device_id: &str) -> u64 {
    let mut trips = trips.lock().unwrap_or_else(PoisonError::into_inner);
    let trip = trips.entry(device_id.to_string()).or_default();
    *trip += 1;
    *trip
}

fn is_current_trip(trips: &Trips, device_id: &str, trip: u64) -> bool {
    let trips = trips.lock().unwrap_or_else(PoisonError::into_inner);
    trips.get(device_id) == Some(&trip)
}

/// Door state shown while moving towards `target`.
const fn moving_state(target: TargetDoorState) -> CurrentDoorState {
    match target {
        TargetDoorState::Open => CurrentDoorState::Opening,
        TargetDoorState::Closed => CurrentDoorState::Closing,
    }
}

/// Door state once `target` has been reached.
const fn settled_state(target: TargetDoorState) -> CurrentDoorState {
    match target {
        TargetDoorState::Open => CurrentDoorState::Open,
        TargetDoorState::Closed => CurrentDoorState::Closed,
    }
}

impl GarageDoor {
    pub const TAG: &'static str = "garage";

    #[must_use]
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            trips: Trips::default(),
        }
    }

    fn target_of(&self, raw: &str) -> Result<TargetDoorState, ServiceError> {
        match raw {
            OPEN => Ok(TargetDoorState::Open),
            CLOSED => Ok(TargetDoorState::Closed),
            _ => Err(ServiceError::translation(
                Self::TAG,
                CharacteristicType::TargetDoorState,
                raw,
            )),
        }
    }

    /// Resolve the door to its final state once the travel time is over,
    /// unless a newer trip has been started in the meantime.
    fn schedule_arrival(&self, accessory: &AccessoryRef, device_id: &str, target: TargetDoorState) {
        let accessory = accessory.clone();
        let travel = self.ctx.door_travel_time;
        let trips = self.trips.clone();
        let device_id = device_id.to_string();
        let trip = next_trip(&trips, &device_id);
        tokio::spawn(async move {
            tokio::time::sleep(travel).await;
            let mut acc = accessory.lock().await;
            let name = acc.display_name.clone();
            if !is_current_trip(&trips, &device_id, trip) {
                log::debug!("[{name}] Door trip superseded, leaving state alone");
                return;
            }
            let Ok(svc) = acc.service_mut(ServiceKind::GarageDoorOpener) else {
                return;
            };
            let current_target = svc
                .value(CharacteristicType::TargetDoorState)
                .and_then(|v| TargetDoorState::try_from(v).ok());
            if current_target != Some(target) {
                log::debug!("[{name}] Door target changed while moving, leaving state alone");
                return;
            }
            if let Err(err) =
                svc.set_characteristic(CharacteristicType::CurrentDoorState, settled_state(target))
            {
                log::error!("[{name}] {err}");
            }
        });
    }
}

#[async_trait]
impl ServiceType for GarageDoor {
    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn service_tag(&self) -> &'static str {
        Self::TAG
    }

    fn category(&self) -> Category {
        Category::GarageDoorOpener
    }

    fn service_kind(&self) -> ServiceKind {
        ServiceKind::GarageDoorOpener
    }

    fn editable_characteristics(&self) -> &'static [CharacteristicType] {
        &[CharacteristicType::TargetDoorState]
    }

    fn readonly_characteristics(&self) -> &'static [CharacteristicType] {
        &[
            CharacteristicType::CurrentDoorState,
            CharacteristicType::ObstructionDetected,
        ]
    }

    fn translate_remote_state(
        &self,
        raw: &str,
        ctype: CharacteristicType,
    ) -> Result<CharacteristicValue, ServiceError> {
        match ctype {
            CharacteristicType::TargetDoorState => Ok(self.target_of(raw)?.into()),
            CharacteristicType::CurrentDoorState => match self.target_of(raw) {
                Ok(target) => Ok(settled_state(target).into()),
                Err(_) => Err(ServiceError::translation(Self::TAG, ctype, raw)),
            },
            _ => Err(ServiceError::translation(Self::TAG, ctype, raw)),
        }
    }

    fn translate_local_state(&self, value: &CharacteristicValue) -> Result<String, ServiceError> {
        match TargetDoorState::try_from(value) {
            Ok(TargetDoorState::Open) => Ok(OPEN.to_string()),
            Ok(TargetDoorState::Closed) => Ok(CLOSED.to_string()),
            Err(_) => Err(ServiceError::translation(
                Self::TAG,
                CharacteristicType::TargetDoorState,
                value,
            )),
        }
    }

    async fn set_characteristic(
        &self,
        accessory: &AccessoryRef,
        ctype: CharacteristicType,
        raw: &str,
    ) -> ApiResult<()> {
        if ctype != CharacteristicType::TargetDoorState {
            return Err(ServiceError::ReadOnly {
                tag: Self::TAG,
                ctype,
            }
            .into());
        }
        let target = self.target_of(raw)?;

        let mut acc = accessory.lock().await;
        let name = acc.display_name.clone();
        let device_id = acc.context.device_id.clone();
        let svc = acc.service_mut(ServiceKind::GarageDoorOpener)?;
        let current = svc
            .value(CharacteristicType::CurrentDoorState)
            .and_then(|v| CurrentDoorState::try_from(v).ok());

        svc.set_characteristic(CharacteristicType::TargetDoorState, target)?;
        if current == Some(settled_state(target)) {
            return Ok(());
        }

        log::info!("[{name}] Door moving to [{raw}]");
        svc.set_characteristic(CharacteristicType::CurrentDoorState, moving_state(target))?;
        drop(acc);

        self.schedule_arrival(accessory, &device_id, target);
        Ok(())
    }

    async fn update_accessory_states(
        &self,
        accessory: &AccessoryRef,
        target: CharacteristicValue,
    ) -> HapStatusResult<()> {
        let target = TargetDoorState::try_from(&target).map_err(|_| HapStatus::InvalidValueInRequest)?;
        let raw = match target {
            TargetDoorState::Open => OPEN,
            TargetDoorState::Closed => CLOSED,
        };

        let (device_id, name) = {
            let mut acc = accessory.lock().await;
            let name = acc.display_name.clone();
            acc.service_mut(ServiceKind::GarageDoorOpener)
                .and_then(|svc| {
                    svc.set_characteristic(CharacteristicType::TargetDoorState, target)?
                        .set_characteristic(CharacteristicType::CurrentDoorState, moving_state(target))
                })
                .map_err(|err| {
                    log::error!("[{name}] {err}");
                    HapStatus::ResourceDoesNotExist
                })?;
            (acc.context.device_id.clone(), name)
        };

        if command_device(&self.ctx, &device_id, raw).await {
            self.schedule_arrival(accessory, &device_id, target);
            return Ok(());
        }

        log::error!("[{name}] Error experienced when attempting to toggle accessory state");
        next_trip(&self.trips, &device_id);
        let mut acc = accessory.lock().await;
        if let Ok(svc) = acc.service_mut(ServiceKind::GarageDoorOpener) {
            let _ = svc.set_characteristic(
                CharacteristicType::CurrentDoorState,
                CurrentDoorState::Stopped,
            );
        }
        Err(HapStatus::ServiceCommunicationFailure)
    }
}
