//! Transport module - the channel between Initiator and Responder.
//!
//! - [`MessageReader`] / [`MessageWriter`] - message-level channel halves
//! - [`StreamReader`] / [`StreamWriter`] - the channel over any tokio byte stream
//! - [`Endpoint`] / [`Listener`] - TCP and Unix Domain Socket endpoints

mod channel;
mod socket;
mod stream;

pub use channel::{BoxFuture, MessageReader, MessageWriter};
#[cfg(unix)]
pub use socket::generate_socket_path;
pub use socket::{BoxedRead, BoxedWrite, Connection, Endpoint, Listener};
pub use stream::{StreamReader, StreamWriter, DEFAULT_READ_BUFFER_SIZE};
