use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HapError, HapResult};
use crate::service::{Service, ServiceKind};

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    GarageDoorOpener,
    Switch,
}

/// Plugin-owned data persisted alongside each accessory by the host.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryContext {
    pub device_id: String,
    pub api_key: String,
    pub device_service_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Accessory {
    pub uuid: Uuid,
    pub display_name: String,
    pub category: Category,
    pub context: AccessoryContext,
    pub services: Vec<Service>,
}

impl Accessory {
    /// Create an accessory carrying only the accessory information service.
    #[must_use]
    pub fn new(display_name: &str, uuid: Uuid, category: Category) -> Self {
        let info = Service::new(ServiceKind::AccessoryInformation, display_name);

        Self {
            uuid,
            display_name: display_name.to_string(),
            category,
            context: AccessoryContext::default(),
            services: vec![info],
        }
    }

    pub fn add_service(&mut self, kind: ServiceKind, name: &str) -> HapResult<&mut Service> {
        if self.get_service(kind).is_some() {
            return Err(HapError::DuplicateService(kind));
        }
        self.services.push(Service::new(kind, name));
        let idx = self.services.len() - 1;
        Ok(&mut self.services[idx])
    }

    #[must_use]
    pub fn get_service(&self, kind: ServiceKind) -> Option<&Service> {
        self.services.iter().find(|svc| svc.kind == kind)
    }

    pub fn service_mut(&mut self, kind: ServiceKind) -> HapResult<&mut Service> {
        self.services
            .iter_mut()
            .find(|svc| svc.kind == kind)
            .ok_or(HapError::MissingService(kind))
    }

    pub fn information_mut(&mut self) -> HapResult<&mut Service> {
        self.service_mut(ServiceKind::AccessoryInformation)
    }
}

/// Derive a stable accessory uuid from a persistent identifier.
#[must_use]
pub fn generate_uuid(data: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, data.as_bytes())
}

#[cfg(test)]
mod tests {
    use crate::accessory::{Accessory, AccessoryContext, Category, generate_uuid};
    use crate::characteristic::{CharacteristicType, CharacteristicValue};
    use crate::error::HapError;
    use crate::service::ServiceKind;

    #[test]
    fn uuid_is_deterministic() {
        assert_eq!(generate_uuid("1000abcdef"), generate_uuid("1000abcdef"));
    }

    #[test]
    fn uuid_uses_input() {
        // these must be different - otherwise we forgot to use input
        assert_ne!(generate_uuid("1000abcdef"), generate_uuid("1000fedcba"));
    }

    #[test]
    fn new_accessory_has_information_service() {
        let acc = Accessory::new("Garage", generate_uuid("a"), Category::GarageDoorOpener);

        let info = acc.get_service(ServiceKind::AccessoryInformation).unwrap();
        assert_eq!(
            info.value(CharacteristicType::Name),
            Some(&CharacteristicValue::String("Garage".to_string()))
        );
    }

    #[test]
    fn duplicate_service_is_rejected() {
        let mut acc = Accessory::new("Lamp", generate_uuid("b"), Category::Switch);

        acc.add_service(ServiceKind::Switch, "Lamp").unwrap();
        let err = acc.add_service(ServiceKind::Switch, "Lamp").unwrap_err();
        assert!(matches!(err, HapError::DuplicateService(ServiceKind::Switch)));
    }

    #[test]
    fn context_uses_host_field_names() {
        let ctx = AccessoryContext {
            device_id: "1000abcdef".to_string(),
            api_key: "key".to_string(),
            device_service_key: "garage".to_string(),
        };

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["deviceId"], "1000abcdef");
        assert_eq!(json["apiKey"], "key");
        assert_eq!(json["deviceServiceKey"], "garage");
    }
}
