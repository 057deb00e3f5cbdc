//! Notifications delivered to the host.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::message::CloseFrame;
use crate::protocol::Negotiated;
use crate::stream::InboundStream;

/// Something that happened on a connection.
#[derive(Debug)]
pub enum Event {
    /// The handshake completed.
    Connected(Negotiated),
    /// A complete text message.
    Text(String),
    /// A binary message; its chunks arrive through the stream.
    Binary(InboundStream),
    /// A pong frame.
    Pong(Bytes),
    /// A protocol, transport or usage error.
    Error(Error),
    /// The connection closed. Always the last event.
    Close(CloseFrame),
}

/// Receiver for a connection's [`Event`]s.
///
/// Yields `None` once the connection task has finished and every event has
/// been received.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::Receiver<Event>,
}

impl Events {
    pub(crate) fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl futures_core::Stream for Events {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}
