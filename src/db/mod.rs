pub mod entities;
pub mod enums;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::StoreError;
pub use store::{AlertStore, CheckRecorder, HealthCheckStore, MonitorStore, TrackedApiStore};
