//! WebSocket client talking to the echo server.
//!
//! Run with: cargo run --example client [ws-host:port]

use std::error::Error;

use streamws::{ClientRequest, CloseCode, Config, Connection, Event};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9001".to_string());
    let socket = TcpStream::connect(&addr).await?;
    socket.set_nodelay(true)?;

    let request = ClientRequest::new(addr.as_str(), "/chat").with_protocols(["chatv1"]);
    let (conn, mut events) = Connection::client(socket, request, Config::default())?;

    while let Some(event) = events.recv().await {
        match event {
            Event::Connected(negotiated) => {
                tracing::info!(protocol = ?negotiated.protocol, "connected");
                conn.send_text("Hello, WebSocket!").await?;
                conn.send_ping(&b"are you there"[..]).await?;

                // one megabyte in 100 KB writes, echoed back as a stream
                let mut upload = conn.begin_binary().await?;
                for _ in 0..10 {
                    upload.write(vec![0x5A; 100_000]).await?;
                }
                upload.finish().await?;
            }
            Event::Text(text) => tracing::info!(%text, "text"),
            Event::Pong(data) => tracing::info!(bytes = data.len(), "pong"),
            Event::Binary(stream) => {
                let data = stream.read_to_end().await;
                tracing::info!(bytes = data.len(), "binary");
                conn.close(CloseCode::Normal, "done").await?;
            }
            Event::Error(err) => tracing::warn!(error = %err, "error"),
            Event::Close(close) => {
                tracing::info!(code = close.code.as_u16(), reason = %close.reason, "closed");
            }
        }
    }

    Ok(())
}
