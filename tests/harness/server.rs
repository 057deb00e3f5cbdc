//! Echo server on a random local port.

use std::net::SocketAddr;

use streamws::{Acceptor, Config, Event};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Echoes every text and binary message back to its sender.
pub struct TestServer {
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> (Self, SocketAddr) {
        Self::spawn_with(Acceptor::new(Config::default())).await
    }

    pub async fn spawn_with(acceptor: Acceptor) -> (Self, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_loop = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let _ = socket.set_nodelay(true);
                let (conn, mut events) = acceptor.accept(socket);
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let echoed = match event {
                            Event::Text(text) => conn.send_text(text).await,
                            Event::Binary(stream) => conn.send_binary(stream.read_to_end().await).await,
                            _ => Ok(()),
                        };
                        if echoed.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        (Self { accept_loop }, addr)
    }

    /// Stop accepting. Connections already open run until their clients close.
    pub async fn shutdown(self) {
        self.accept_loop.abort();
        let _ = self.accept_loop.await;
    }
}
