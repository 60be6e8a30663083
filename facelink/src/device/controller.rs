use super::sender::MessageSender;
use super::status::DeviceStatus;
use crate::config::SessionConfig;
use crate::osc::{address, Arg, Message};

use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cadence at which `Controller::poll_once` is expected to be called.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Time without a battery report after which a connected device is
/// considered gone. Must leave room for at least one lost reply.
pub const STALE_TIMEOUT: Duration = Duration::from_secs(11);

/// Non-fatal configuration problems detected while driving a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// A session was about to start with nowhere to stream to.
    NoStreamTargetOnLaunch,
    /// Looking for the device with nowhere to stream to.
    NoStreamTargetWhileSearching,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::NoStreamTargetOnLaunch => {
                write!(f, "no stream target to send the live data to, please add one")
            }
            Diagnostic::NoStreamTargetWhileSearching => write!(
                f,
                "trying to connect but no recording destination is configured"
            ),
        }
    }
}

/// Observable side effects of driving a `Controller`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StatusChanged {
        from: DeviceStatus,
        to: DeviceStatus,
    },
    /// A battery report was accepted.
    Battery(f32),
    Warning(Diagnostic),
    /// The device port changed; any channel to the device must be recreated.
    PortChanged(u16),
    /// The device was deleted and wants no more polling.
    PollingStopped,
}

impl Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceEvent::StatusChanged { from, to } => write!(f, "{} -> {}", from, to),
            DeviceEvent::Battery(level) => write!(f, "battery {:.0}%", level * 100.0),
            DeviceEvent::Warning(diag) => write!(f, "warning: {}", diag),
            DeviceEvent::PortChanged(port) => write!(f, "port changed to {}", port),
            DeviceEvent::PollingStopped => write!(f, "polling stopped"),
        }
    }
}

/// What the scheduler should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// Last battery report and when it arrived. Kept as a single value so the
/// two can only ever change together.
#[derive(Debug, Clone, Copy)]
struct Liveness {
    battery: f32,
    at: Instant,
}

/// Connection state machine for one capture device.
///
/// The controller never touches the network or the clock by itself: every
/// operation takes the current time and configuration from the caller,
/// queues the messages it wants sent (see `flush` and `drain_messages`)
/// and the events it produced (see `drain_events`). It is meant to be
/// owned by a single task that also calls `poll_once` every
/// `POLL_INTERVAL`.
pub struct Controller {
    name: String,
    status: DeviceStatus,
    osc_port: u16,
    liveness: Liveness,
    look_for_device: bool,
    display_on: bool,
    polling_stopped: bool,
    outbox: VecDeque<Message>,
    event_queue: VecDeque<DeviceEvent>,
}

impl Controller {
    pub fn new(name: &str, osc_port: u16, now: Instant) -> Controller {
        Controller {
            name: name.to_string(),
            status: DeviceStatus::Disconnected,
            osc_port,
            liveness: Liveness {
                battery: 1.0,
                at: now,
            },
            look_for_device: true,
            display_on: true,
            polling_stopped: false,
            outbox: VecDeque::new(),
            event_queue: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn battery(&self) -> f32 {
        self.liveness.battery
    }

    pub fn last_liveness(&self) -> Instant {
        self.liveness.at
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    pub fn osc_port(&self) -> u16 {
        self.osc_port
    }

    pub fn look_for_device(&self) -> bool {
        self.look_for_device
    }

    fn set_status(&mut self, to: DeviceStatus) {
        let from = self.status;
        if from == to {
            return;
        }
        self.status = to;
        info!(device = %self.name, "{} -> {}", from, to);
        self.event_queue
            .push_back(DeviceEvent::StatusChanged { from, to });
    }

    fn warn(&mut self, diag: Diagnostic) {
        warn!(device = %self.name, "{}", diag);
        self.event_queue.push_back(DeviceEvent::Warning(diag));
    }

    fn send(&mut self, msg: Message) {
        self.outbox.push_back(msg);
    }

    /// Starts the handshake. A disconnected device is marked closed first,
    /// acknowledging its stale session, and then ready.
    pub fn connect(&mut self) {
        if self.status.is_deleted() {
            return;
        }
        if self.status.is_disconnected() {
            self.set_status(DeviceStatus::Closed);
        }
        self.set_status(DeviceStatus::Ready);
    }

    pub fn disconnect(&mut self) {
        if self.status.is_deleted() {
            return;
        }
        self.set_status(DeviceStatus::Disconnected);
    }

    pub fn request_delete(&mut self) {
        self.set_status(DeviceStatus::Delete);
    }

    /// Gates whether `poll_once` tries to reach the device. Does not change
    /// the status.
    pub fn set_look_for_device(&mut self, look: bool) {
        self.look_for_device = look;
    }

    /// Accepts a battery report, the proof that the device is alive.
    ///
    /// A device reporting while we consider it disconnected was left running
    /// across a restart on our side: it is promoted straight to open and a
    /// new session is launched.
    pub fn confirm_liveness(&mut self, level: f32, now: Instant, config: &dyn SessionConfig) {
        if self.status.is_deleted() {
            debug!(device = %self.name, "ignoring battery report from deleted device");
            return;
        }
        let battery = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            self.liveness.battery
        };
        self.liveness = Liveness { battery, at: now };
        self.event_queue.push_back(DeviceEvent::Battery(battery));

        if self.status.is_disconnected() {
            self.set_status(DeviceStatus::Open);
            self.launch(config);
        }
    }

    /// Accepts the device's acknowledgement of our reply address.
    ///
    /// A device left running across a restart on our side answers the
    /// search with this confirmation, so a disconnected device is promoted
    /// to open and relaunched. Battery and liveness are left untouched.
    pub fn confirm_send_target(&mut self, config: &dyn SessionConfig) {
        if !self.status.is_disconnected() {
            return;
        }
        self.set_status(DeviceStatus::Open);
        self.launch(config);
    }

    /// Starts the capture session and points its live stream at every
    /// configured target. Ignored once the device is deleted.
    pub fn launch(&mut self, config: &dyn SessionConfig) {
        if self.status.is_deleted() {
            return;
        }
        let targets = config.stream_targets();
        if targets.is_empty() {
            self.warn(Diagnostic::NoStreamTargetOnLaunch);
            self.set_status(DeviceStatus::Disconnected);
            return;
        }

        let subject = self.name.clone();
        self.send(Message::new(address::LIVE_LINK_SUBJECT, vec![subject.into()]));
        self.send(Message::new(address::ARSESSION_START, vec![Arg::Int(1)]));

        // Clear first so repeated launches don't pile up stale targets.
        self.send(Message::new(
            address::CLEAR_LIVE_LINK_ADDRESSES,
            vec![Arg::Int(1)],
        ));
        for target in targets {
            self.send(Message::new(
                address::ADD_LIVE_LINK_ADDRESS,
                vec![target.host.into(), Arg::Int(i32::from(target.port))],
            ));
        }

        self.send(Message::new(
            address::LIVE_LINK_STREAM_START,
            vec![Arg::Int(1)],
        ));
    }

    /// Stops the capture session. The connection status is left alone.
    pub fn close(&mut self) {
        self.send(Message::new(address::ARSESSION_STOP, vec![Arg::Int(1)]));
    }

    /// One heartbeat step, to be called every `POLL_INTERVAL`.
    ///
    /// There is no transport-level disconnect signal, so this is the only
    /// place a silently vanished device gets noticed.
    pub fn poll_once(&mut self, now: Instant, config: &dyn SessionConfig) -> Tick {
        if self.polling_stopped {
            return Tick::Stop;
        }

        if self.status.has_begun_handshake()
            && now.saturating_duration_since(self.liveness.at) > STALE_TIMEOUT
        {
            self.disconnect();
        }

        if self.look_for_device {
            if config.stream_targets().is_empty() {
                self.warn(Diagnostic::NoStreamTargetWhileSearching);
            } else if self.status.has_begun_handshake() {
                self.battery_query();
            } else {
                // The device must know where to reply before being asked.
                self.add_send_target(config);
                self.battery_query();
            }
        }

        // Checked last: a deletion still lets the rest of this tick happen.
        if self.status.is_deleted() {
            self.polling_stopped = true;
            self.event_queue.push_back(DeviceEvent::PollingStopped);
            return Tick::Stop;
        }
        Tick::Continue
    }

    fn battery_query(&mut self) {
        self.send(Message::new(address::BATTERY_QUERY, vec![Arg::Int(1)]).quiet());
    }

    fn add_send_target(&mut self, config: &dyn SessionConfig) {
        self.send(Message::new(
            address::OSC_ADD_SEND_TARGET,
            vec![
                config.listen_address().into(),
                Arg::Int(i32::from(config.server_port())),
            ],
        ));
    }

    pub fn set_take(&mut self, take: i32) {
        self.send(Message::new(address::TAKE, vec![Arg::Int(take)]));
    }

    pub fn set_slate(&mut self, slate: &str) {
        self.send(Message::new(address::SLATE, vec![slate.into()]));
    }

    /// Starts recording on the device, if it is connected and takes part
    /// in recordings. The protocol has no room for the description.
    pub fn record_start(
        &mut self,
        slate: &str,
        take: i32,
        _description: &str,
        config: &dyn SessionConfig,
    ) {
        if self.status.is_disconnected() || !config.is_recording_participant(&self.name) {
            return;
        }
        self.send(Message::new(
            address::RECORD_START,
            vec![slate.into(), Arg::Int(take)],
        ));
    }

    /// Flips the device display. Nothing is awaited from the device.
    pub fn toggle_display(&mut self) {
        let addr = if self.display_on {
            address::DISPLAY_OFF
        } else {
            address::DISPLAY_ON
        };
        self.display_on = !self.display_on;
        self.send(Message::new(addr, vec![Arg::Int(1)]));
    }

    /// Records a new device port. Whoever owns the channel to the device
    /// is told through `DeviceEvent::PortChanged` and must replace it.
    pub fn apply_port_change(&mut self, port: u16) {
        if port == self.osc_port {
            return;
        }
        info!(device = %self.name, "port {} -> {}", self.osc_port, port);
        self.osc_port = port;
        self.event_queue.push_back(DeviceEvent::PortChanged(port));
    }

    /// Hands every queued message to `sender`, in order.
    pub fn flush<S: MessageSender + ?Sized>(&mut self, sender: &mut S) {
        while let Some(msg) = self.outbox.pop_front() {
            sender.send(&msg);
        }
    }

    pub fn drain_messages(&mut self) -> Vec<Message> {
        self.outbox.drain(..).collect()
    }

    pub fn try_next_event(&mut self) -> Option<DeviceEvent> {
        self.event_queue.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<DeviceEvent> {
        self.event_queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamTarget;

    struct TestConfig {
        targets: Vec<StreamTarget>,
        recording: bool,
    }

    impl TestConfig {
        fn with_target() -> TestConfig {
            TestConfig {
                targets: vec![StreamTarget::new("10.0.0.5")],
                recording: true,
            }
        }

        fn empty() -> TestConfig {
            TestConfig {
                targets: vec![],
                recording: true,
            }
        }
    }

    impl SessionConfig for TestConfig {
        fn stream_targets(&self) -> Vec<StreamTarget> {
            self.targets.clone()
        }

        fn listen_address(&self) -> String {
            "192.168.1.10".to_string()
        }

        fn server_port(&self) -> u16 {
            6000
        }

        fn is_recording_participant(&self, _device: &str) -> bool {
            self.recording
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn addresses(msgs: &[Message]) -> Vec<&str> {
        msgs.iter().map(|m| m.address.as_str()).collect()
    }

    fn status_changes(events: &[DeviceEvent]) -> Vec<(DeviceStatus, DeviceStatus)> {
        events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::StatusChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    fn warnings(events: &[DeviceEvent]) -> Vec<Diagnostic> {
        events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Warning(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Controller already open, with the launch traffic discarded.
    fn open_controller(t0: Instant, config: &TestConfig) -> Controller {
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.confirm_liveness(1.0, t0, config);
        assert_eq!(ctl.status(), DeviceStatus::Open);
        ctl.drain_messages();
        ctl.drain_events();
        ctl
    }

    #[test]
    fn fresh_device_defaults() {
        let t0 = Instant::now();
        let ctl = Controller::new("iPhone", 8000, t0);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
        assert_eq!(ctl.battery(), 1.0);
        assert_eq!(ctl.last_liveness(), t0);
        assert!(ctl.display_on());
        assert!(ctl.look_for_device());
        assert_eq!(ctl.osc_port(), 8000);
    }

    #[test]
    fn stale_connection_disconnects_exactly_once() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.connect();
        ctl.drain_events();

        assert_eq!(ctl.poll_once(t0 + secs(5), &config), Tick::Continue);
        assert_eq!(ctl.poll_once(t0 + secs(10), &config), Tick::Continue);
        assert_eq!(ctl.status(), DeviceStatus::Ready);
        // Exactly at the limit is not stale yet.
        ctl.poll_once(t0 + secs(11), &config);
        assert_eq!(ctl.status(), DeviceStatus::Ready);

        ctl.poll_once(t0 + secs(12), &config);
        ctl.poll_once(t0 + secs(17), &config);
        ctl.poll_once(t0 + secs(22), &config);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
        assert_eq!(
            status_changes(&ctl.drain_events()),
            vec![(DeviceStatus::Ready, DeviceStatus::Disconnected)]
        );
    }

    #[test]
    fn battery_reports_keep_connection_alive() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);

        for i in 1..10 {
            let now = t0 + secs(5 * i);
            ctl.confirm_liveness(0.5, now, &config);
            ctl.poll_once(now + secs(1), &config);
        }
        assert_eq!(ctl.status(), DeviceStatus::Open);
        assert!(ctl.drain_events().iter().all(|e| !matches!(
            e,
            DeviceEvent::StatusChanged { .. }
        )));
    }

    #[test]
    fn stale_check_runs_before_any_send() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);

        ctl.poll_once(t0 + secs(15), &config);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
        // Already disconnected when choosing what to send: full search round.
        assert_eq!(
            addresses(&ctl.drain_messages()),
            vec![address::OSC_ADD_SEND_TARGET, address::BATTERY_QUERY]
        );
    }

    #[test]
    fn liveness_while_disconnected_opens_and_launches() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);

        ctl.confirm_liveness(0.8, t0 + secs(3), &config);
        assert_eq!(ctl.status(), DeviceStatus::Open);
        assert_eq!(ctl.battery(), 0.8);
        assert_eq!(ctl.last_liveness(), t0 + secs(3));

        let msgs = ctl.drain_messages();
        assert_eq!(
            addresses(&msgs),
            vec![
                address::LIVE_LINK_SUBJECT,
                address::ARSESSION_START,
                address::CLEAR_LIVE_LINK_ADDRESSES,
                address::ADD_LIVE_LINK_ADDRESS,
                address::LIVE_LINK_STREAM_START,
            ]
        );
        assert_eq!(msgs[0].args, vec![Arg::from("iPhone")]);
        assert_eq!(msgs[3].args, vec![Arg::from("10.0.0.5"), Arg::Int(11111)]);
        assert!(msgs.iter().all(|m| m.log));

        let events = ctl.drain_events();
        assert_eq!(events[0], DeviceEvent::Battery(0.8));
        assert_eq!(
            status_changes(&events),
            vec![(DeviceStatus::Disconnected, DeviceStatus::Open)]
        );
    }

    #[test]
    fn liveness_without_targets_stays_disconnected() {
        let t0 = Instant::now();
        let config = TestConfig::empty();
        let mut ctl = Controller::new("iPhone", 8000, t0);

        ctl.confirm_liveness(0.4, t0, &config);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
        assert_eq!(ctl.battery(), 0.4);
        assert!(ctl.drain_messages().is_empty());
        assert_eq!(
            warnings(&ctl.drain_events()),
            vec![Diagnostic::NoStreamTargetOnLaunch]
        );
    }

    #[test]
    fn liveness_while_connected_only_updates_battery() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);

        ctl.confirm_liveness(0.3, t0 + secs(4), &config);
        assert_eq!(ctl.status(), DeviceStatus::Open);
        assert_eq!(ctl.battery(), 0.3);
        assert_eq!(ctl.last_liveness(), t0 + secs(4));
        assert!(ctl.drain_messages().is_empty());
    }

    #[test]
    fn out_of_range_battery_is_clamped() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);

        ctl.confirm_liveness(1.7, t0 + secs(1), &config);
        assert_eq!(ctl.battery(), 1.0);
        ctl.confirm_liveness(-0.2, t0 + secs(2), &config);
        assert_eq!(ctl.battery(), 0.0);
        ctl.confirm_liveness(f32::NAN, t0 + secs(3), &config);
        assert_eq!(ctl.battery(), 0.0);
        assert_eq!(ctl.last_liveness(), t0 + secs(3));
    }

    #[test]
    fn connect_passes_through_closed() {
        let t0 = Instant::now();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.connect();
        assert_eq!(ctl.status(), DeviceStatus::Ready);
        assert_eq!(
            status_changes(&ctl.drain_events()),
            vec![
                (DeviceStatus::Disconnected, DeviceStatus::Closed),
                (DeviceStatus::Closed, DeviceStatus::Ready),
            ]
        );
    }

    #[test]
    fn connect_from_open_goes_to_ready() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);
        ctl.connect();
        assert_eq!(
            status_changes(&ctl.drain_events()),
            vec![(DeviceStatus::Open, DeviceStatus::Ready)]
        );
    }

    #[test]
    fn search_registers_target_before_querying() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);

        assert_eq!(ctl.poll_once(t0 + secs(5), &config), Tick::Continue);
        let msgs = ctl.drain_messages();
        assert_eq!(
            addresses(&msgs),
            vec![address::OSC_ADD_SEND_TARGET, address::BATTERY_QUERY]
        );
        assert_eq!(
            msgs[0].args,
            vec![Arg::from("192.168.1.10"), Arg::Int(6000)]
        );
        assert!(msgs[0].log);
        assert!(!msgs[1].log);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
    }

    #[test]
    fn connected_poll_only_queries_battery() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);

        ctl.poll_once(t0 + secs(5), &config);
        let msgs = ctl.drain_messages();
        assert_eq!(addresses(&msgs), vec![address::BATTERY_QUERY]);
        assert!(!msgs[0].log);
    }

    #[test]
    fn search_without_targets_only_warns() {
        let t0 = Instant::now();
        let config = TestConfig::empty();
        let mut ctl = Controller::new("iPhone", 8000, t0);

        ctl.poll_once(t0 + secs(5), &config);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
        assert!(ctl.drain_messages().is_empty());
        let events = ctl.drain_events();
        assert_eq!(events, vec![DeviceEvent::Warning(
            Diagnostic::NoStreamTargetWhileSearching
        )]);
    }

    #[test]
    fn not_looking_sends_nothing() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.set_look_for_device(false);

        ctl.poll_once(t0 + secs(5), &config);
        assert!(ctl.drain_messages().is_empty());
        assert!(ctl.drain_events().is_empty());
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
    }

    #[test]
    fn not_looking_still_detects_staleness() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);
        ctl.set_look_for_device(false);

        ctl.poll_once(t0 + secs(20), &config);
        assert_eq!(ctl.status(), DeviceStatus::Disconnected);
        assert!(ctl.drain_messages().is_empty());
    }

    #[test]
    fn record_start_is_gated() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);

        ctl.record_start("scene1", 3, "first try", &config);
        assert!(ctl.drain_messages().is_empty());

        ctl.connect();
        let not_recording = TestConfig {
            recording: false,
            ..TestConfig::with_target()
        };
        ctl.record_start("scene1", 3, "first try", &not_recording);
        assert!(ctl.drain_messages().is_empty());

        ctl.record_start("scene1", 3, "first try", &config);
        let msgs = ctl.drain_messages();
        assert_eq!(addresses(&msgs), vec![address::RECORD_START]);
        assert_eq!(msgs[0].args, vec![Arg::from("scene1"), Arg::Int(3)]);
    }

    #[test]
    fn take_and_slate_are_unconditional() {
        let t0 = Instant::now();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.set_take(7);
        ctl.set_slate("scene2");
        let msgs = ctl.drain_messages();
        assert_eq!(addresses(&msgs), vec![address::TAKE, address::SLATE]);
        assert_eq!(msgs[0].args, vec![Arg::Int(7)]);
        assert_eq!(msgs[1].args, vec![Arg::from("scene2")]);
    }

    #[test]
    fn toggle_display_flips_state() {
        let t0 = Instant::now();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.toggle_display();
        assert!(!ctl.display_on());
        ctl.toggle_display();
        assert!(ctl.display_on());
        assert_eq!(
            addresses(&ctl.drain_messages()),
            vec![address::DISPLAY_OFF, address::DISPLAY_ON]
        );
    }

    #[test]
    fn close_keeps_status() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);
        ctl.close();
        assert_eq!(ctl.status(), DeviceStatus::Open);
        assert_eq!(
            addresses(&ctl.drain_messages()),
            vec![address::ARSESSION_STOP]
        );
    }

    #[test]
    fn relaunch_clears_before_adding() {
        let t0 = Instant::now();
        let config = TestConfig {
            targets: vec![StreamTarget::new("10.0.0.5"), StreamTarget::new("10.0.0.6")],
            recording: true,
        };
        let mut ctl = open_controller(t0, &config);
        ctl.launch(&config);
        assert_eq!(
            addresses(&ctl.drain_messages()),
            vec![
                address::LIVE_LINK_SUBJECT,
                address::ARSESSION_START,
                address::CLEAR_LIVE_LINK_ADDRESSES,
                address::ADD_LIVE_LINK_ADDRESS,
                address::ADD_LIVE_LINK_ADDRESS,
                address::LIVE_LINK_STREAM_START,
            ]
        );
    }

    #[test]
    fn delete_stops_polling_once() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = open_controller(t0, &config);

        ctl.request_delete();
        assert_eq!(ctl.poll_once(t0 + secs(5), &config), Tick::Stop);
        // The deleting tick still searched.
        assert_eq!(
            addresses(&ctl.drain_messages()),
            vec![address::OSC_ADD_SEND_TARGET, address::BATTERY_QUERY]
        );

        assert_eq!(ctl.poll_once(t0 + secs(10), &config), Tick::Stop);
        assert!(ctl.drain_messages().is_empty());
        let stops = ctl
            .drain_events()
            .into_iter()
            .filter(|e| *e == DeviceEvent::PollingStopped)
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn deleted_device_ignores_transitions() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.request_delete();
        ctl.drain_events();

        ctl.connect();
        ctl.disconnect();
        ctl.confirm_liveness(0.2, t0 + secs(1), &config);
        assert_eq!(ctl.status(), DeviceStatus::Delete);
        assert_eq!(ctl.battery(), 1.0);
        assert!(ctl.drain_events().is_empty());
        assert!(ctl.drain_messages().is_empty());

        // Never looks connected, so never goes stale either.
        ctl.set_look_for_device(false);
        ctl.poll_once(t0 + secs(60), &config);
        assert_eq!(ctl.status(), DeviceStatus::Delete);
    }

    #[test]
    fn deleted_device_is_not_launched() {
        let t0 = Instant::now();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.request_delete();
        ctl.drain_events();

        ctl.launch(&TestConfig::empty());
        assert_eq!(ctl.status(), DeviceStatus::Delete);
        assert!(ctl.drain_events().is_empty());

        ctl.launch(&TestConfig::with_target());
        assert!(ctl.drain_messages().is_empty());

        ctl.set_look_for_device(false);
        assert_eq!(ctl.poll_once(t0 + secs(5), &TestConfig::empty()), Tick::Stop);
        assert_eq!(ctl.drain_events(), vec![DeviceEvent::PollingStopped]);
    }

    #[test]
    fn send_target_confirmation_relaunches_disconnected_device() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);

        ctl.confirm_send_target(&config);
        assert_eq!(ctl.status(), DeviceStatus::Open);
        assert_eq!(
            ctl.drain_events(),
            vec![DeviceEvent::StatusChanged {
                from: DeviceStatus::Disconnected,
                to: DeviceStatus::Open,
            }]
        );
        let msgs = ctl.drain_messages();
        assert_eq!(
            addresses(&msgs),
            vec![
                address::LIVE_LINK_SUBJECT,
                address::ARSESSION_START,
                address::CLEAR_LIVE_LINK_ADDRESSES,
                address::ADD_LIVE_LINK_ADDRESS,
                address::LIVE_LINK_STREAM_START,
            ]
        );
        assert_eq!(ctl.battery(), 1.0);
        assert_eq!(ctl.last_liveness(), t0);

        // Already open: a repeated confirmation changes nothing.
        ctl.confirm_send_target(&config);
        assert!(ctl.drain_events().is_empty());
        assert!(ctl.drain_messages().is_empty());
    }

    #[test]
    fn send_target_confirmation_ignored_once_deleted() {
        let mut ctl = Controller::new("iPhone", 8000, Instant::now());
        ctl.request_delete();
        ctl.drain_events();

        ctl.confirm_send_target(&TestConfig::with_target());
        assert_eq!(ctl.status(), DeviceStatus::Delete);
        assert!(ctl.drain_events().is_empty());
        assert!(ctl.drain_messages().is_empty());
    }

    #[test]
    fn port_change_is_reported_once() {
        let t0 = Instant::now();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.apply_port_change(8000);
        assert!(ctl.drain_events().is_empty());
        ctl.apply_port_change(9000);
        assert_eq!(ctl.osc_port(), 9000);
        assert_eq!(ctl.drain_events(), vec![DeviceEvent::PortChanged(9000)]);
    }

    #[test]
    fn flush_preserves_order() {
        let t0 = Instant::now();
        let config = TestConfig::with_target();
        let mut ctl = Controller::new("iPhone", 8000, t0);
        ctl.poll_once(t0 + secs(5), &config);
        ctl.set_take(1);

        let mut sent: Vec<Message> = Vec::new();
        ctl.flush(&mut sent);
        assert_eq!(
            addresses(&sent),
            vec![
                address::OSC_ADD_SEND_TARGET,
                address::BATTERY_QUERY,
                address::TAKE
            ]
        );
        assert!(ctl.drain_messages().is_empty());
    }
}
