//! Shared helpers for the integration tests.
//!
//! [`TestServer`] runs a TCP echo server on a random port and
//! [`TestClient`] drives one client connection against it. [`pair`] wires a
//! client and a server together over an in-memory duplex pipe.

#![allow(dead_code)]

mod client;
mod metrics;
mod server;

pub use client::TestClient;
pub use metrics::{Latencies, Metrics};
pub use server::TestServer;

use streamws::{Acceptor, ClientRequest, Config, Connection, Event, Events};

/// A connected client/server pair over `tokio::io::duplex`.
///
/// Both `Connected` events have already been consumed.
pub async fn pair(acceptor: Acceptor, request: ClientRequest, config: Config) -> (Side, Side) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (server, mut server_events) = acceptor.accept(server_io);
    let (client, mut client_events) = Connection::client(client_io, request, config).unwrap();

    let client_protocol = expect_connected(&mut client_events).await;
    let server_protocol = expect_connected(&mut server_events).await;

    (
        Side {
            conn: client,
            events: client_events,
            protocol: client_protocol,
        },
        Side {
            conn: server,
            events: server_events,
            protocol: server_protocol,
        },
    )
}

/// Pair with default settings on both ends.
pub async fn default_pair() -> (Side, Side) {
    pair(
        Acceptor::default(),
        ClientRequest::new("localhost", "/"),
        Config::default(),
    )
    .await
}

/// One end of a [`pair`].
pub struct Side {
    pub conn: Connection,
    pub events: Events,
    pub protocol: Option<String>,
}

impl Side {
    /// Next event that is not a pong.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.events.recv().await {
                Some(Event::Pong(_)) => continue,
                other => return other,
            }
        }
    }

    /// Drain events until the close notification and return it.
    pub async fn closed(&mut self) -> streamws::CloseFrame {
        loop {
            match self.events.recv().await {
                Some(Event::Close(close)) => return close,
                Some(_) => continue,
                None => panic!("event stream ended without a close event"),
            }
        }
    }
}

async fn expect_connected(events: &mut Events) -> Option<String> {
    match events.recv().await {
        Some(Event::Connected(negotiated)) => negotiated.protocol,
        other => panic!("expected Connected, got {:?}", other),
    }
}
