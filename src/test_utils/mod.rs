//! Test utilities.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository, queue and publisher implementations
//! - A recording payment gateway double
//! - A builder wiring use cases and `AppState` against the mocks

mod app_state_builder;
mod billing_mocks;
pub mod factories;
mod gateway_mocks;
mod queue_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use gateway_mocks::*;
pub use queue_mocks::*;
