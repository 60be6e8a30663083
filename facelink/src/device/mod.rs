mod controller;
mod sender;
mod status;

pub use controller::{Controller, DeviceEvent, Diagnostic, Tick};
pub use controller::{POLL_INTERVAL, STALE_TIMEOUT};
pub use sender::MessageSender;
pub use status::DeviceStatus;
