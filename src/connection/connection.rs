use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::config::Config;
use crate::connection::event::{Event, Events};
use crate::connection::{Action, ConnectionState, Role, Session};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::ClientRequest;
use crate::stream::{Fragment, InboundStream, OutboundStream};

type Ack = oneshot::Sender<Result<()>>;

/// Host requests forwarded to the connection task.
pub(crate) enum Command {
    Send {
        message: Message,
        done: Ack,
    },
    Ping {
        data: Bytes,
        done: Ack,
    },
    BeginStream {
        done: Ack,
    },
    StreamFrame {
        fragment: Fragment,
        done: Option<Ack>,
    },
    Close {
        code: CloseCode,
        reason: String,
        done: Ack,
    },
}

/// Handle to a running WebSocket connection.
///
/// The connection itself runs as a spawned tokio task that owns the
/// transport; this handle sends it commands and is cheap to clone. Every
/// command resolves once the frames it produced were written to the
/// transport. When the last handle (and the last [`OutboundStream`]) is
/// dropped the connection closes with 1001.
///
/// Events are read from the [`Events`] receiver returned alongside the
/// handle. While the host is behind on events (or on the chunks of an
/// [`InboundStream`]) the task stops reading the transport, which pushes
/// back on the peer; commands keep being served in the meantime.
///
/// ## Example
///
/// ```rust,ignore
/// use streamws::{ClientRequest, Config, Connection, Event};
///
/// let tcp = tokio::net::TcpStream::connect("127.0.0.1:9001").await?;
/// let request = ClientRequest::new("127.0.0.1:9001", "/chat");
/// let (conn, mut events) = Connection::client(tcp, request, Config::default())?;
///
/// while let Some(event) = events.recv().await {
///     match event {
///         Event::Connected(_) => conn.send_text("hello").await?,
///         Event::Text(text) => println!("{text}"),
///         Event::Close(close) => println!("closed: {:?}", close.code),
///         _ => {}
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    role: Role,
    fragment_size: usize,
}

impl Connection {
    /// Start a client connection over an established transport.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the upgrade request cannot be built.
    pub fn client<T>(io: T, request: ClientRequest, config: Config) -> Result<(Self, Events)>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let session = Session::client(request, config)?;
        Ok(Self::spawn(io, session))
    }

    /// Run `session` over `io` on a new task.
    pub(crate) fn spawn<T>(io: T, session: Session) -> (Self, Events)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = session.config().clone();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let handle = Self {
            commands: command_tx,
            role: session.role(),
            fragment_size: config.fragment_size,
        };
        let driver = Driver {
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            config,
            io,
            session,
            commands: command_rx,
            commands_open: true,
            events: event_tx,
            inbound: None,
            pending: VecDeque::new(),
            broken: false,
        };
        tokio::spawn(driver.run());
        (handle, Events::new(event_rx))
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns `true` once the connection task has finished.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen` outside the open state, `Error::StreamInProgress`
    /// while a binary stream is being sent, `Error::ConnectionClosed` once
    /// the task is gone, or the transport's write error.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    /// Send a binary message as a single frame.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send_text`].
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Send a text or binary message.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send_text`].
    pub async fn send(&self, message: Message) -> Result<()> {
        self.request(|done| Command::Send { message, done }).await
    }

    /// Send a ping. Allowed while a binary stream is in progress.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen`, or `Error::ControlFrameTooLarge` above 125 bytes.
    pub async fn send_ping(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.request(|done| Command::Ping { data, done }).await
    }

    /// Start a streamed binary message.
    ///
    /// Complete sends are rejected until the returned stream is finished or
    /// dropped.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen`, or `Error::StreamInProgress` if a stream is
    /// already active.
    pub async fn begin_binary(&self) -> Result<OutboundStream> {
        self.request(|done| Command::BeginStream { done }).await?;
        Ok(OutboundStream::new(self.commands.clone(), self.fragment_size))
    }

    /// Close the connection.
    ///
    /// Resolves once the close frame was written. Closing an already closed
    /// connection succeeds.
    ///
    /// # Errors
    ///
    /// Only the transport's write error.
    pub async fn close(&self, code: CloseCode, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        match self.request(|done| Command::Close { code, reason, done }).await {
            Err(Error::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn request(&self, command: impl FnOnce(Ack) -> Command) -> Result<()> {
        let (done, ack) = oneshot::channel();
        self.commands
            .send(command(done))
            .map_err(|_| Error::ConnectionClosed)?;
        ack.await.map_err(|_| Error::ConnectionClosed)?
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A notification waiting for room in its channel.
enum Delivery {
    Event(Event),
    /// Start of an inbound binary message.
    Stream {
        chunks: mpsc::Sender<Bytes>,
        stream: InboundStream,
    },
    Chunk(Bytes),
    StreamEnd,
}

/// The task side: owns the transport and the session.
struct Driver<T> {
    io: T,
    session: Session,
    config: Config,
    read_buf: BytesMut,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    events: mpsc::Sender<Event>,
    inbound: Option<mpsc::Sender<Bytes>>,
    /// Notifications not yet handed to the host, in order.
    pending: VecDeque<Delivery>,
    /// Set after a write failure or shutdown; later writes are dropped.
    broken: bool,
}

impl<T> Driver<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    async fn run(mut self) {
        let role = self.session.role();
        debug!(%role, "connection task started");

        loop {
            let _ = self.drain().await;
            if self.session.is_terminated() && self.pending.is_empty() {
                break;
            }

            // the transport is only read once the host has taken every notification
            let reading =
                self.pending.is_empty() && self.session.state() != ConnectionState::Closed;
            if reading {
                self.read_buf.reserve(self.config.read_buffer_size);
            }

            tokio::select! {
                read = self.io.read_buf(&mut self.read_buf), if reading => match read {
                    Ok(0) => self.session.transport_closed(),
                    Ok(n) => {
                        trace!(%role, bytes = n, "read");
                        let data = self.read_buf.split();
                        self.session.receive(&data);
                    }
                    Err(err) => self.session.transport_error(err.into()),
                },
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        debug!(%role, "all handles dropped");
                        self.commands_open = false;
                        self.session.close(CloseCode::GoingAway, "");
                    }
                },
                () = room_for(&self.events, self.inbound.as_ref(), self.pending.front()),
                    if !self.pending.is_empty() => self.deliver(),
            }
        }

        debug!(%role, "connection task finished");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Send { message, done } => {
                let result = self.session.send(message);
                self.ack(result, done).await;
            }
            Command::Ping { data, done } => {
                let result = self.session.send_ping(data);
                self.ack(result, done).await;
            }
            Command::BeginStream { done } => {
                let result = self.session.begin_stream();
                self.ack(result, done).await;
            }
            Command::StreamFrame { fragment, done } => {
                let result =
                    self.session
                        .stream_frame(fragment.payload, fragment.first, fragment.fin);
                match done {
                    Some(done) => self.ack(result, done).await,
                    None => {
                        let _ = self.drain().await;
                    }
                }
            }
            Command::Close { code, reason, done } => {
                self.session.close(code, &reason);
                self.ack(Ok(()), done).await;
            }
        }
    }

    /// Resolve a command after its output reached the transport.
    async fn ack(&mut self, result: Result<()>, done: Ack) {
        let written = self.drain().await;
        let _ = done.send(result.and(written));
    }

    /// Write what the session produced and queue its notifications.
    /// Returns the first write error.
    async fn drain(&mut self) -> Result<()> {
        let mut written = Ok(());
        while let Some(action) = self.session.poll_action() {
            let delivery = match action {
                Action::Write(bytes) => {
                    if self.broken {
                        continue;
                    }
                    if let Err(err) = self.write(&bytes).await {
                        self.broken = true;
                        let err = Error::from(err);
                        if written.is_ok() {
                            written = Err(err.clone());
                        }
                        self.session.transport_error(err);
                    }
                    continue;
                }
                Action::Shutdown => {
                    if !self.broken {
                        self.broken = true;
                        let _ = self.io.shutdown().await;
                    }
                    continue;
                }
                Action::Connected(negotiated) => Delivery::Event(Event::Connected(negotiated)),
                Action::Text(text) => Delivery::Event(Event::Text(text)),
                Action::Pong(data) => Delivery::Event(Event::Pong(data)),
                Action::Error(err) => Delivery::Event(Event::Error(err)),
                Action::Closed(close) => Delivery::Event(Event::Close(close)),
                Action::BinaryStart => {
                    let (chunks, rx) = mpsc::channel(self.config.stream_capacity.max(1));
                    Delivery::Stream {
                        chunks,
                        stream: InboundStream::new(rx),
                    }
                }
                Action::BinaryChunk(chunk) => Delivery::Chunk(chunk),
                Action::BinaryEnd => Delivery::StreamEnd,
            };
            self.pending.push_back(delivery);
        }
        written
    }

    /// Hand the oldest pending notification to the host.
    ///
    /// The driver is the only sender on both channels, so the room found by
    /// [`room_for`] is still there.
    fn deliver(&mut self) {
        match self.pending.pop_front() {
            // the host may have dropped its receiver; the connection carries on
            Some(Delivery::Event(event)) => {
                let _ = self.events.try_send(event);
            }
            Some(Delivery::Stream { chunks, stream }) => {
                self.inbound = Some(chunks);
                let _ = self.events.try_send(Event::Binary(stream));
            }
            Some(Delivery::Chunk(chunk)) => {
                if let Some(tx) = &self.inbound {
                    // a consumer that dropped its stream just misses the rest
                    if tx.try_send(chunk).is_err() {
                        self.inbound = None;
                    }
                }
            }
            Some(Delivery::StreamEnd) => self.inbound = None,
            None => {}
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.io.write_all(bytes).await?;
        self.io.flush().await?;
        trace!(role = %self.session.role(), bytes = bytes.len(), "wrote");
        Ok(())
    }
}

/// Resolves once `next` can be delivered without waiting.
async fn room_for(
    events: &mpsc::Sender<Event>,
    inbound: Option<&mpsc::Sender<Bytes>>,
    next: Option<&Delivery>,
) {
    match next {
        Some(Delivery::Event(_) | Delivery::Stream { .. }) => {
            let _ = events.reserve().await;
        }
        Some(Delivery::Chunk(_)) => {
            if let Some(tx) = inbound {
                let _ = tx.reserve().await;
            }
        }
        Some(Delivery::StreamEnd) | None => {}
    }
}
