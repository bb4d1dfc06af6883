use async_trait::async_trait;

use hap::{Category, CharacteristicType, CharacteristicValue, HapStatus, HapStatusResult, ServiceKind};

use crate::accessory::AccessoryRef;
use crate::error::ApiResult;
use crate::service::{ServiceContext, ServiceError, ServiceType, command_device};

const ON: &str = "on";
const OFF: &str = "off";

pub struct Switch {
    ctx: ServiceContext,
}

impl Switch {
    pub const TAG: &'static str = "switch";

    #[must_use]
    pub const fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ServiceType for Switch {
    fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn service_tag(&self) -> &'static str {
        Self::TAG
    }

    fn category(&self) -> Category {
        Category::Switch
    }

    fn service_kind(&self) -> ServiceKind {
        ServiceKind::Switch
    }

    fn editable_characteristics(&self) -> &'static [CharacteristicType] {
        &[CharacteristicType::On]
    }

    fn readonly_characteristics(&self) -> &'static [CharacteristicType] {
        &[]
    }

    fn translate_remote_state(
        &self,
        raw: &str,
        ctype: CharacteristicType,
    ) -> Result<CharacteristicValue, ServiceError> {
        match (ctype, raw) {
            (CharacteristicType::On, ON) => Ok(CharacteristicValue::Bool(true)),
            (CharacteristicType::On, OFF) => Ok(CharacteristicValue::Bool(false)),
            _ => Err(ServiceError::translation(Self::TAG, ctype, raw)),
        }
    }

    fn translate_local_state(&self, value: &CharacteristicValue) -> Result<String, ServiceError> {
        match value.as_bool() {
            Some(true) => Ok(ON.to_string()),
            Some(false) => Ok(OFF.to_string()),
            None => Err(ServiceError::translation(
                Self::TAG,
                CharacteristicType::On,
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
        let value = self.translate_remote_state(raw, ctype)?;
        let mut acc = accessory.lock().await;
        log::info!("[{}] Updating {ctype} to [{raw}]", acc.display_name);
        acc.service_mut(ServiceKind::Switch)?
            .set_characteristic(ctype, value)?;
        Ok(())
    }

    async fn update_accessory_states(
        &self,
        accessory: &AccessoryRef,
        target: CharacteristicValue,
    ) -> HapStatusResult<()> {
        let (device_id, name) = {
            let acc = accessory.lock().await;
            (acc.context.device_id.clone(), acc.display_name.clone())
        };
        let raw = self
            .translate_local_state(&target)
            .map_err(|_| HapStatus::InvalidValueInRequest)?;

        if !command_device(&self.ctx, &device_id, &raw).await {
            log::error!("[{name}] Error experienced when attempting to toggle accessory state");
            return Err(HapStatus::ServiceCommunicationFailure);
        }

        let mut acc = accessory.lock().await;
        acc.service_mut(ServiceKind::Switch)
            .and_then(|svc| svc.set_characteristic(CharacteristicType::On, target))
            .map_err(|err| {
                log::error!("[{name}] {err}");
                HapStatus::ResourceDoesNotExist
            })?;
        Ok(())
    }
}
