use std::fmt::{self, Display};

/// Connection state of a device.
///
/// The variants are totally ordered: `Delete < Disconnected < Closed <
/// Ready < Open`. Anything past `Disconnected` has at least begun the
/// connection handshake. `Delete` is terminal and sorts lowest so that a
/// device pending removal never looks connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceStatus {
    Delete,
    Disconnected,
    Closed,
    Ready,
    Open,
}

impl DeviceStatus {
    pub fn has_begun_handshake(&self) -> bool {
        *self > DeviceStatus::Disconnected
    }

    pub fn is_disconnected(&self) -> bool {
        *self == DeviceStatus::Disconnected
    }

    pub fn is_deleted(&self) -> bool {
        *self == DeviceStatus::Delete
    }
}

impl Default for DeviceStatus {
    fn default() -> DeviceStatus {
        DeviceStatus::Disconnected
    }
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DeviceStatus::Delete => "deleted",
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Closed => "closed",
            DeviceStatus::Ready => "ready",
            DeviceStatus::Open => "open",
        };
        write!(f, "{}", name)
    }
}
