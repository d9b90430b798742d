pub mod alert_broadcaster;
pub mod config;

pub use alert_broadcaster::AlertBroadcaster;
pub use config::{ConfigError, MonitorConfig};
