pub mod billing_event;
pub mod billing_scope;
pub mod directory;
pub mod dunning;
pub mod mapping_entity_type;
pub mod payment_provider;
pub mod provider_mapping;
pub mod subscription;
pub mod webhook_event;
