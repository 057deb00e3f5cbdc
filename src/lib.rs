//! # streamws - RFC 6455 WebSocket engine
//!
//! `streamws` runs the WebSocket protocol directly over a byte-stream
//! transport the host has already established (TCP, TLS, anything
//! `AsyncRead + AsyncWrite`), as either client or server.
//!
//! ## Features
//!
//! - **Incremental handshake** tolerant of arbitrary segment boundaries
//! - **Frame codec** working in place against a bounded receive buffer
//! - **Streamed binary messages** in both directions, with backpressure
//! - **Sans-I/O core** ([`Session`]) plus a tokio driver ([`Connection`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use streamws::{Acceptor, Config, Event};
//!
//! let acceptor = Acceptor::new(Config::default()).with_protocols(["chatv1"]);
//! let (socket, _) = listener.accept().await?;
//! let (conn, mut events) = acceptor.accept(socket);
//!
//! while let Some(event) = events.recv().await {
//!     if let Event::Text(text) = event {
//!         conn.send_text(text).await?;
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod stream;

pub use config::Config;
pub use connection::{Acceptor, Action, ConnectionState, Role, Session};
#[cfg(feature = "async-tokio")]
pub use connection::{Connection, Event, Events};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{
    AllowedProtocols, ClientRequest, Negotiated, OpCode, ProtocolSelector, WS_GUID,
    compute_accept_key,
};
#[cfg(feature = "async-tokio")]
pub use stream::{InboundStream, OutboundStream};
