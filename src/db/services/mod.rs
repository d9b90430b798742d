//! Store implementations and read-side services.
//!
//! `SeaOrmStore` is the production store; `MemoryStore` keeps everything in
//! process and backs the engine and scheduler tests.

pub mod dashboard_service;
pub mod memory_store;
pub mod sea_orm_store;

pub use dashboard_service::*;
pub use memory_store::MemoryStore;
pub use sea_orm_store::SeaOrmStore;
