pub mod config;
pub mod device;
pub mod link;
mod link_core;
pub mod osc;

pub use config::{SessionConfig, Settings};
pub use device::{Controller, DeviceEvent, DeviceStatus};
pub use link::Link;
