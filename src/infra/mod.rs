pub mod app;
pub mod config;
pub mod db;
pub mod dummy_gateway;
pub mod dunning_worker;
pub mod error;
pub mod http_client;
pub mod redis_queue;
pub mod setup;
pub mod stripe_client;
pub mod stripe_gateway;
pub mod webhook_worker;
