//! Client side of the echo tests.

use std::net::SocketAddr;

use bytes::Bytes;
use streamws::{ClientRequest, CloseCode, Config, Connection, Event, Events, Result};
use tokio::net::TcpStream;

pub struct TestClient {
    pub id: usize,
    conn: Connection,
    events: Events,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_id(addr, 0).await
    }

    /// Connect and wait for the handshake to finish.
    pub async fn connect_with_id(addr: SocketAddr, id: usize) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let request = ClientRequest::new(addr.to_string(), format!("/client/{}", id));
        let (conn, mut events) = Connection::client(socket, request, Config::default())?;

        loop {
            match events.recv().await {
                Some(Event::Connected(_)) => break,
                Some(Event::Error(err)) => return Err(err),
                Some(_) => continue,
                None => return Err(streamws::Error::ConnectionClosed),
            }
        }

        Ok(Self { id, conn, events })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.conn.send_text(text).await
    }

    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.conn.send_binary(data).await
    }

    pub async fn send_ping(&mut self, data: &[u8]) -> Result<()> {
        self.conn.send_ping(Bytes::copy_from_slice(data)).await
    }

    /// Next text message, or `None` once the connection closed.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.events.recv().await {
                Some(Event::Text(text)) => return Ok(Some(text)),
                Some(Event::Error(err)) => return Err(err),
                Some(Event::Close(_)) | None => return Ok(None),
                Some(_) => continue,
            }
        }
    }

    /// Next binary message, read to its end.
    pub async fn recv_binary(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.events.recv().await {
                Some(Event::Binary(stream)) => return Ok(Some(stream.read_to_end().await)),
                Some(Event::Error(err)) => return Err(err),
                Some(Event::Close(_)) | None => return Ok(None),
                Some(_) => continue,
            }
        }
    }

    /// Wait for the next pong.
    pub async fn recv_pong(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.events.recv().await {
                Some(Event::Pong(data)) => return Ok(Some(data)),
                Some(Event::Error(err)) => return Err(err),
                Some(Event::Close(_)) | None => return Ok(None),
                Some(_) => continue,
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.conn.close(CloseCode::Normal, "").await?;
        while self.events.recv().await.is_some() {}
        Ok(())
    }
}
