//! Addresses understood by the capture app.

pub const TAKE: &str = "/Take";
pub const SLATE: &str = "/Slate";

/// Asks the device to report its battery level. The answer doubles as
/// the liveness signal.
pub const BATTERY_QUERY: &str = "/BatteryQuery";
/// Battery report sent back by the device, one float in [0, 1].
pub const BATTERY: &str = "/Battery";

/// Tells the device where to send its replies: (address, port).
pub const OSC_ADD_SEND_TARGET: &str = "/OSCAddSendTarget";
pub const OSC_ADD_SEND_TARGET_CONFIRM: &str = "/OSCAddSendTargetConfirm";

pub const LIVE_LINK_SUBJECT: &str = "/LiveLinkSubject";
pub const ARSESSION_START: &str = "/ARSessionStart";
pub const ARSESSION_STOP: &str = "/ARSessionStop";
pub const CLEAR_LIVE_LINK_ADDRESSES: &str = "/ClearAllLiveLinkAddresses";
pub const ADD_LIVE_LINK_ADDRESS: &str = "/AddLiveLinkAddress";
pub const LIVE_LINK_STREAM_START: &str = "/LiveLinkStreamStart";

pub const RECORD_START: &str = "/RecordStart";

pub const DISPLAY_ON: &str = "/DisplayOn";
pub const DISPLAY_OFF: &str = "/DisplayOff";
