//! WebSocket echo server.
//!
//! Run with: cargo run --example echo_server
//! Then connect with: cargo run --example client
//!
//! Set `RUST_LOG=streamws=debug` to watch connections open and close.

use std::error::Error;

use streamws::{Acceptor, Config, Connection, Event, Events};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const ADDR: &str = "127.0.0.1:9001";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let acceptor = Acceptor::new(Config::default()).with_protocols(["chatv1", "echo"]);
    let listener = TcpListener::bind(ADDR).await?;
    tracing::info!(addr = ADDR, "echo server listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let (conn, events) = acceptor.accept(socket);
        tracing::info!(%peer, "accepted");

        tokio::spawn(async move {
            echo(conn, events).await;
            tracing::info!(%peer, "finished");
        });
    }
}

async fn echo(conn: Connection, mut events: Events) {
    while let Some(event) = events.recv().await {
        let result = match event {
            Event::Connected(negotiated) => {
                tracing::info!(path = %negotiated.path, protocol = ?negotiated.protocol, "connected");
                Ok(())
            }
            Event::Text(text) => conn.send_text(text).await,
            Event::Binary(incoming) => {
                // the inbound stream must be drained before the connection
                // can take more commands once its chunk queue is full
                let data = incoming.read_to_end().await;
                tracing::debug!(bytes = data.len(), "echoing binary");
                conn.send_binary(data).await
            }
            Event::Pong(_) => Ok(()),
            Event::Error(err) => {
                tracing::warn!(error = %err, "connection error");
                Ok(())
            }
            Event::Close(close) => {
                tracing::info!(code = close.code.as_u16(), reason = %close.reason, "closed");
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "echo failed");
        }
    }
}
