pub mod address;
pub mod port;
pub mod proto;

pub use port::{Datagram, Listener, Port};
pub use proto::{Arg, Message};
