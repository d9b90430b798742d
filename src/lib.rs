pub mod alerting;
pub mod db;
pub mod monitoring;
pub mod server;
pub mod version;
