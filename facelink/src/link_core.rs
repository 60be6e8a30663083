use crate::config::Settings;
use crate::device::{Controller, DeviceEvent, Tick};
use crate::link::Command;
use crate::osc::Port;

use crossbeam::atomic::AtomicCell;
use crossbeam::channel;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-device event loop. Sole owner of the controller and of the port to
/// the device, so every state change and every port swap happens on this
/// thread, between two complete operations.
pub(crate) struct LinkCore {
    controller: Controller,
    settings: Settings,
    /// Shared with the `Link` handle, which routes replies by it.
    address: Arc<AtomicCell<IpAddr>>,
    port: Port,
    interval: Duration,
    commands: channel::Receiver<Command>,
    events: channel::Sender<DeviceEvent>,
}

impl LinkCore {
    pub fn new(
        controller: Controller,
        settings: Settings,
        address: Arc<AtomicCell<IpAddr>>,
        port: Port,
        interval: Duration,
        commands: channel::Receiver<Command>,
        events: channel::Sender<DeviceEvent>,
    ) -> LinkCore {
        LinkCore {
            controller,
            settings,
            address,
            port,
            interval,
            commands,
            events,
        }
    }

    fn execute(&mut self, cmd: Command) {
        let ctl = &mut self.controller;
        match cmd {
            Command::Connect => ctl.connect(),
            Command::Disconnect => ctl.disconnect(),
            Command::Delete => ctl.request_delete(),
            Command::LookForDevice(look) => ctl.set_look_for_device(look),
            Command::Launch => ctl.launch(&self.settings),
            Command::Close => ctl.close(),
            Command::SetTake(take) => ctl.set_take(take),
            Command::SetSlate(slate) => ctl.set_slate(&slate),
            Command::RecordStart {
                slate,
                take,
                description,
            } => ctl.record_start(&slate, take, &description, &self.settings),
            Command::ToggleDisplay => ctl.toggle_display(),
            Command::SetPort(port) => ctl.apply_port_change(port),
            Command::Liveness(level) => ctl.confirm_liveness(level, Instant::now(), &self.settings),
            Command::SendTargetConfirmed => ctl.confirm_send_target(&self.settings),
            Command::ReplaceSettings(settings) => {
                // A port change recreates the port through its event; a bare
                // address change has to do it here.
                let mut moved = false;
                match settings.device(ctl.name()) {
                    Some(dev) => {
                        moved = dev.address != self.address.load() && dev.osc_port == ctl.osc_port();
                        self.address.store(dev.address);
                        ctl.apply_port_change(dev.osc_port);
                    }
                    None => warn!(device = %ctl.name(), "device no longer in settings"),
                }
                self.settings = settings;
                if moved {
                    self.recreate_port(self.controller.osc_port());
                }
            }
        }
    }

    /// Replaces the port to the device. The new port is fully built before
    /// the old one goes away; if that fails the old one stays in use.
    fn recreate_port(&mut self, osc_port: u16) {
        let addr = SocketAddr::new(self.address.load(), osc_port);
        match Port::new(&addr) {
            Ok(port) => {
                info!(device = %self.controller.name(), "moving from {} to {}", self.port.peer(), addr);
                self.port = port;
            }
            Err(err) => {
                warn!(device = %self.controller.name(), error = %err, "cannot open port to {}", addr)
            }
        }
    }

    fn dispatch(&mut self) {
        self.controller.flush(&mut self.port);
        while let Some(event) = self.controller.try_next_event() {
            if let DeviceEvent::PortChanged(port) = event {
                self.recreate_port(port);
            }
            // Nobody listening, or not keeping up: events are informational.
            let _ = self.events.try_send(event);
        }
    }

    pub fn run(&mut self) {
        let ticker = channel::tick(self.interval);
        let commands = self.commands.clone();
        loop {
            let keep_going = channel::select! {
                recv(commands) -> cmd => match cmd {
                    Ok(cmd) => {
                        self.execute(cmd);
                        true
                    }
                    Err(_) => false,
                },
                recv(ticker) -> _ => {
                    self.controller.poll_once(Instant::now(), &self.settings) == Tick::Continue
                }
            };
            self.dispatch();
            if !keep_going {
                break;
            }
        }
        debug!(device = %self.controller.name(), "link exiting");
    }
}
