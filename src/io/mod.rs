//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `store` - Food store port and its error type
//! - `memory_store` - In-process store (JSON seed, tests)
//! - `postgres_store` - Postgres store (sqlx, migrations)
//! - `notifier` - Notification port and the log-only sender
//! - `http_notifier` - Push-relay sender over HTTP
//! - `mqtt_notifier` - MQTT sender
//! - `status_server` - Metrics, health and manual trigger HTTP endpoint

pub mod http_notifier;
pub mod memory_store;
pub mod mqtt_notifier;
pub mod notifier;
pub mod postgres_store;
pub mod status_server;
pub mod store;

// Re-export commonly used types
pub use http_notifier::HttpNotifier;
pub use memory_store::MemoryFoodStore;
pub use mqtt_notifier::MqttNotifier;
pub use notifier::{LogNotifier, Notifier};
pub use postgres_store::PgFoodStore;
pub use store::{FoodStore, StoreError};
