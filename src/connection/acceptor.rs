//! Server-side accept context.

use std::sync::Arc;

use crate::config::Config;
use crate::connection::Session;
use crate::protocol::{AllowedProtocols, ProtocolSelector};

/// Creates server connections that share one protocol selector and config.
///
/// Accepting sockets stays with the host; an `Acceptor` only turns an
/// accepted transport into a WebSocket connection.
#[derive(Clone, Default)]
pub struct Acceptor {
    selector: Option<Arc<dyn ProtocolSelector>>,
    config: Config,
}

impl Acceptor {
    /// Acceptor that negotiates no sub-protocol.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            selector: None,
            config,
        }
    }

    /// Accept the first offered protocol that appears in `protocols`.
    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selector = Some(Arc::new(AllowedProtocols::new(protocols)));
        self
    }

    /// Use a custom selection function or type.
    #[must_use]
    pub fn with_selector<S>(mut self, selector: S) -> Self
    where
        S: ProtocolSelector + 'static,
    {
        self.selector = Some(Arc::new(selector));
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fresh server session for driving by hand.
    #[must_use]
    pub fn session(&self) -> Session {
        Session::server(self.selector.clone(), self.config.clone())
    }

    /// Run a server connection over an accepted transport.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(feature = "async-tokio")]
    pub fn accept<T>(&self, io: T) -> (crate::Connection, crate::Events)
    where
        T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        crate::Connection::spawn(io, self.session())
    }
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("selector", &self.selector.is_some())
            .field("config", &self.config)
            .finish()
    }
}
