//! UDP ports
//!
//! `Port` sends messages to a single device. Datagrams are fire-and-forget:
//! a failed send is logged and dropped, never reported to the caller.
//!
//! `Listener` receives the datagrams devices send back to us. It bridges a
//! `mio` socket to an owned callback running in a dedicated thread, which
//! is usually used to feed a `crossbeam::channel` (see `rx_to_channel`).

use super::proto::{self, Message};
use crate::device::MessageSender;

use mio::net::UdpSocket;
use std::io;
use std::net::SocketAddr;
use std::thread;
use tracing::{debug, info, trace, warn};

/// Message received by a `Listener`, tagged with its origin.
pub type Datagram = (SocketAddr, Result<Message, proto::Error>);

/// Default size of the rx channel when receiving to a crossbeam channel.
static DEFAULT_RX_CHANNEL_SIZE: usize = 64;

const WAKE: mio::Token = mio::Token(0);
const SOCKET: mio::Token = mio::Token(1);

fn unspecified_for(address: &SocketAddr) -> SocketAddr {
    match address {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

/// Outbound channel to one device.
pub struct Port {
    sock: UdpSocket,
    peer: SocketAddr,
}

impl Port {
    /// Returns a new `Port` sending to `address`.
    pub fn new(address: &SocketAddr) -> Result<Port, io::Error> {
        let sock = UdpSocket::bind(unspecified_for(address))?;
        sock.connect(*address)?;
        Ok(Port {
            sock,
            peer: *address,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl MessageSender for Port {
    fn send(&mut self, msg: &Message) {
        let raw = match msg.serialize() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "cannot encode {}", msg);
                return;
            }
        };
        match self.sock.send(&raw) {
            Ok(_) => {
                if msg.log {
                    info!(peer = %self.peer, "sent {}", msg);
                } else {
                    trace!(peer = %self.peer, "sent {}", msg);
                }
            }
            // Includes WouldBlock and the ICMP-induced ConnectionRefused of a
            // device that is not listening. Either way, there is nobody to tell.
            Err(err) => debug!(peer = %self.peer, error = %err, "dropped {}", msg),
        }
    }
}

/// Inbound socket, serviced by its own thread.
pub struct Listener {
    local: SocketAddr,
    stop: Option<crossbeam::channel::Sender<()>>,
    waker: mio::Waker,
    thread: Option<thread::JoinHandle<()>>,
}

impl Listener {
    fn poller_thread<RxCallbackT: Fn(Datagram) -> io::Result<()>>(
        mut sock: UdpSocket,
        mut poll: mio::Poll,
        rx: RxCallbackT,
        stop: crossbeam::channel::Receiver<()>,
    ) {
        use crossbeam::channel::TryRecvError;

        let mut events = mio::Events::with_capacity(8);
        let mut buf = [0u8; proto::MAX_DATAGRAM_SIZE];

        if let Err(err) = poll
            .registry()
            .register(&mut sock, SOCKET, mio::Interest::READABLE)
        {
            warn!(error = %err, "listener registration failed");
            return;
        }

        'ioloop: loop {
            if let Err(err) = poll.poll(&mut events, None) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(error = %err, "listener poll failed");
                break;
            }

            for event in events.iter() {
                match event.token() {
                    WAKE => {
                        if let Err(TryRecvError::Disconnected) = stop.try_recv() {
                            break 'ioloop;
                        }
                    }
                    SOCKET => loop {
                        match sock.recv_from(&mut buf) {
                            Ok((size, from)) => {
                                let res = Message::deserialize(&buf[..size]);
                                if rx((from, res)).is_err() {
                                    // RX callback signaled an error, terminate.
                                    break 'ioloop;
                                }
                            }
                            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                            Err(err) => {
                                debug!(error = %err, "listener receive failed");
                                break;
                            }
                        }
                    },
                    _ => {}
                }
            }
        }
        debug!("listener thread exiting");
    }

    /// Binds `address` and starts delivering received datagrams to `rx`.
    /// If `rx` returns an `Err()`, the listener stops.
    pub fn new<RXT: Fn(Datagram) -> io::Result<()> + Send + 'static>(
        address: &SocketAddr,
        rx: RXT,
    ) -> io::Result<Listener> {
        let sock = UdpSocket::bind(*address)?;
        let local = sock.local_addr()?;
        let poll = mio::Poll::new()?;
        let waker = mio::Waker::new(poll.registry(), WAKE)?;
        let (stop, stop_rx) = crossbeam::channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("osc-listener".to_string())
            .spawn(move || Listener::poller_thread(sock, poll, rx, stop_rx))?;
        Ok(Listener {
            local,
            stop: Some(stop),
            waker,
            thread: Some(thread),
        })
    }

    /// Address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Creates a sender/receiver pair to be used with `rx_to_channel`.
    pub fn rx_channel() -> (
        crossbeam::channel::Sender<Datagram>,
        crossbeam::channel::Receiver<Datagram>,
    ) {
        crossbeam::channel::bounded::<Datagram>(DEFAULT_RX_CHANNEL_SIZE)
    }

    /// Returns a RX callback which forwards datagrams to a channel, silently
    /// dropping them when the channel is full, and stopping the listener
    /// when the receiving end goes away.
    pub fn rx_to_channel(
        rx_send: crossbeam::channel::Sender<Datagram>,
    ) -> impl Fn(Datagram) -> io::Result<()> {
        use crossbeam::channel::TrySendError;
        move |datagram| match rx_send.try_send(datagram) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop.take();
        if self.waker.wake().is_ok() {
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
