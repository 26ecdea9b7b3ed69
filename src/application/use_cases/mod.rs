pub mod billing;
pub mod directory;
pub mod dunning;
pub mod gateway_admin;
pub mod gateway_factory;
pub mod provider_mapping;
pub mod subscription;
pub mod webhook_ingestion;
pub mod webhook_normalizer;
pub mod webhook_processing;
