//! Envelope codec and the TCP/UDP transports that carry it.
mod envelope;
mod transport;


pub use envelope::{Command, Envelope, Notice, decode, encode};
pub use transport::{
    Listener, MAX_TCP_MESSAGE_BYTES, MAX_UDP_MESSAGE_BYTES, Messenger, resolve,
};
