//! SeaORM entities for the monitoring tables.

pub mod alert;
pub mod health_check;
pub mod tracked_api;
