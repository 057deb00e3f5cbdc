//! Connection state machine and its async driver.
//!
//! [`Session`] is the whole protocol state machine with no I/O attached.
//! With the `async-tokio` feature, [`Connection`] runs a session over any
//! `AsyncRead + AsyncWrite` transport on its own task and reports what
//! happens through [`Events`].
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - Handshake bytes are accumulated until the head is complete
//! 2. **Open** - Messages flow both ways
//! 3. **Closing** - Close frame sent, waiting for the peer's (only with
//!    `Config::await_close_echo`)
//! 4. **Closed** - Terminal; exactly one close notification has been emitted

mod acceptor;
mod buffer;
mod role;
mod session;
mod state;

pub use acceptor::Acceptor;
pub use buffer::ReceiveBuffer;
pub use role::Role;
pub use session::{Action, Session};
pub use state::ConnectionState;

#[cfg(feature = "async-tokio")]
#[allow(clippy::module_inception)]
mod connection;
#[cfg(feature = "async-tokio")]
mod event;

#[cfg(feature = "async-tokio")]
pub(crate) use connection::Command;
#[cfg(feature = "async-tokio")]
pub use connection::Connection;
#[cfg(feature = "async-tokio")]
pub use event::{Event, Events};
