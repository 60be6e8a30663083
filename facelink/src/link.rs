//! Link
//!
//! A link drives one device: it owns the device `Controller` and the UDP
//! `Port` to the device in a dedicated thread, calls the poll step every
//! `POLL_INTERVAL`, and turns the methods of `Link` into commands for that
//! thread. State changes and diagnostics come back as `DeviceEvent`s.
//!
//! Replies from the device arrive on a shared `osc::Listener`; whoever owns
//! it hands them to the right link with `report_datagram`.

use crate::config::Settings;
use crate::device::{Controller, DeviceEvent, POLL_INTERVAL};
use crate::link_core::LinkCore;
use crate::osc::{address, Message, Port};

use crossbeam::atomic::AtomicCell;
use crossbeam::channel;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Default size of the event channel of a link.
static EVENT_CHANNEL_SIZE: usize = 256;

/// Operations executed by the link thread.
#[derive(Debug, Clone)]
pub enum Command {
    Connect,
    Disconnect,
    Delete,
    LookForDevice(bool),
    Launch,
    Close,
    SetTake(i32),
    SetSlate(String),
    RecordStart {
        slate: String,
        take: i32,
        description: String,
    },
    ToggleDisplay,
    SetPort(u16),
    /// Battery level reported by the device.
    Liveness(f32),
    /// The device acknowledged our reply address.
    SendTargetConfirmed,
    ReplaceSettings(Settings),
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("device {0} is not configured")]
    UnknownDevice(String),
    #[error("cannot open port to device: {0}")]
    Port(#[from] io::Error),
    #[error("link to the device has shut down")]
    Disconnected,
}

/// Handle to a running link. Dropping it stops the link thread.
pub struct Link {
    name: String,
    address: Arc<AtomicCell<IpAddr>>,
    commands: channel::Sender<Command>,
    events: channel::Receiver<DeviceEvent>,
}

impl Link {
    /// Starts driving the device called `device` in `settings`.
    pub fn new(settings: Settings, device: &str) -> Result<Link, LinkError> {
        Link::with_interval(settings, device, POLL_INTERVAL)
    }

    /// Same as `new()`, with a custom poll interval.
    pub fn with_interval(
        settings: Settings,
        device: &str,
        interval: Duration,
    ) -> Result<Link, LinkError> {
        let dev = settings
            .device(device)
            .ok_or_else(|| LinkError::UnknownDevice(device.to_string()))?
            .clone();
        let port = Port::new(&dev.socket_addr())?;
        let controller = Controller::new(&dev.name, dev.osc_port, Instant::now());
        let address = Arc::new(AtomicCell::new(dev.address));

        let (command_sender, command_receiver) = channel::unbounded::<Command>();
        let (event_sender, event_receiver) = channel::bounded::<DeviceEvent>(EVENT_CHANNEL_SIZE);

        let mut core = LinkCore::new(
            controller,
            settings,
            address.clone(),
            port,
            interval,
            command_receiver,
            event_sender,
        );
        thread::Builder::new()
            .name(format!("link-{}", dev.name))
            .spawn(move || core.run())?;

        Ok(Link {
            name: dev.name,
            address,
            commands: command_sender,
            events: event_receiver,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current address of the device. Datagrams from this address belong
    /// to this link. Follows settings replaced with `replace_settings`.
    pub fn address(&self) -> IpAddr {
        self.address.load()
    }

    /// Receiver for the events of this device.
    pub fn events(&self) -> &channel::Receiver<DeviceEvent> {
        &self.events
    }

    pub fn command(&self, cmd: Command) -> Result<(), LinkError> {
        self.commands
            .send(cmd)
            .map_err(|_| LinkError::Disconnected)
    }

    pub fn connect(&self) -> Result<(), LinkError> {
        self.command(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<(), LinkError> {
        self.command(Command::Disconnect)
    }

    pub fn request_delete(&self) -> Result<(), LinkError> {
        self.command(Command::Delete)
    }

    pub fn set_look_for_device(&self, look: bool) -> Result<(), LinkError> {
        self.command(Command::LookForDevice(look))
    }

    pub fn launch(&self) -> Result<(), LinkError> {
        self.command(Command::Launch)
    }

    pub fn close(&self) -> Result<(), LinkError> {
        self.command(Command::Close)
    }

    pub fn set_take(&self, take: i32) -> Result<(), LinkError> {
        self.command(Command::SetTake(take))
    }

    pub fn set_slate(&self, slate: &str) -> Result<(), LinkError> {
        self.command(Command::SetSlate(slate.to_string()))
    }

    pub fn record_start(&self, slate: &str, take: i32, description: &str) -> Result<(), LinkError> {
        self.command(Command::RecordStart {
            slate: slate.to_string(),
            take,
            description: description.to_string(),
        })
    }

    pub fn toggle_display(&self) -> Result<(), LinkError> {
        self.command(Command::ToggleDisplay)
    }

    pub fn set_port(&self, port: u16) -> Result<(), LinkError> {
        self.command(Command::SetPort(port))
    }

    pub fn replace_settings(&self, settings: Settings) -> Result<(), LinkError> {
        self.command(Command::ReplaceSettings(settings))
    }

    /// Hands over a message received from the device.
    pub fn report_datagram(&self, msg: &Message) -> Result<(), LinkError> {
        match msg.address.as_str() {
            address::OSC_ADD_SEND_TARGET_CONFIRM => self.command(Command::SendTargetConfirmed),
            address::BATTERY => match msg.first_f32() {
                Some(level) => self.command(Command::Liveness(level)),
                None => {
                    debug!(device = %self.name, "battery report without level: {}", msg);
                    Ok(())
                }
            },
            _ => {
                debug!(device = %self.name, "unhandled {}", msg);
                Ok(())
            }
        }
    }
}
