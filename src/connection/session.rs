//! Sans-I/O connection state machine.
//!
//! A [`Session`] owns everything a connection knows except the transport.
//! Bytes read from the transport go in through [`Session::receive`]; host
//! commands go in through the `send_*`/`close` methods. Everything the
//! session wants done in return (bytes to write, events to deliver, the
//! transport to shut down) is queued as [`Action`]s and drained with
//! [`Session::poll_action`], in order.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::connection::{ConnectionState, ReceiveBuffer, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::mask::random_mask;
use crate::protocol::{
    Assembled, BAD_REQUEST, ClientRequest, Frame, HandshakeRequest, HttpHead,
    MAX_CONTROL_FRAME_PAYLOAD, MessageAssembler, Negotiated, OpCode, ProtocolSelector,
    build_response, check_response, find_head_end, generate_key,
};

/// Work the session hands back to whoever drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Bytes to write to the transport.
    Write(Bytes),
    /// The handshake completed.
    Connected(Negotiated),
    /// A complete text message arrived.
    Text(String),
    /// A binary message started; chunks follow.
    BinaryStart,
    /// Next chunk of the current binary message.
    BinaryChunk(Bytes),
    /// The current binary message ended (normally or because the connection closed).
    BinaryEnd,
    /// A pong arrived.
    Pong(Bytes),
    /// Something went wrong. Fatal errors are followed by `Closed`.
    Error(Error),
    /// The connection closed. Emitted exactly once.
    Closed(CloseFrame),
    /// Shut the transport down.
    Shutdown,
}

enum Endpoint {
    Client {
        request: ClientRequest,
        key: String,
    },
    Server {
        selector: Option<Arc<dyn ProtocolSelector>>,
    },
}

/// Connection state machine for one endpoint.
pub struct Session {
    role: Role,
    state: ConnectionState,
    endpoint: Endpoint,
    config: Config,
    buffer: ReceiveBuffer,
    /// Bytes of the handshake head already scanned for its terminator.
    head_scan: usize,
    assembler: MessageAssembler,
    outbound_stream: bool,
    pending_close: Option<CloseFrame>,
    protocol: Option<String>,
    close_notified: bool,
    shutdown_requested: bool,
    actions: VecDeque<Action>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("outbound_stream", &self.outbound_stream)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl Session {
    /// Client session. The upgrade request is queued as the first write.
    ///
    /// # Errors
    ///
    /// Fails if no handshake nonce can be generated or a request header
    /// value contains CR/LF.
    pub fn client(request: ClientRequest, config: Config) -> Result<Self> {
        let key = generate_key()?;
        let head = request.build(&key)?;
        let mut session = Self::new(Role::Client, Endpoint::Client { request, key }, config);
        session.actions.push_back(Action::Write(Bytes::from(head)));
        debug!(role = %session.role, "sent upgrade request");
        Ok(session)
    }

    /// Server session waiting for an upgrade request.
    #[must_use]
    pub fn server(selector: Option<Arc<dyn ProtocolSelector>>, config: Config) -> Self {
        Self::new(Role::Server, Endpoint::Server { selector }, config)
    }

    fn new(role: Role, endpoint: Endpoint, config: Config) -> Self {
        Self {
            role,
            state: ConnectionState::Connecting,
            endpoint,
            buffer: ReceiveBuffer::new(config.max_buffer_length),
            head_scan: 0,
            assembler: MessageAssembler::new(config.max_buffer_length),
            config,
            outbound_stream: false,
            pending_close: None,
            protocol: None,
            close_notified: false,
            shutdown_requested: false,
            actions: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sub-protocol agreed during the handshake.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Whether a streamed binary message is being sent.
    #[must_use]
    pub fn has_outbound_stream(&self) -> bool {
        self.outbound_stream
    }

    /// Next queued action, if any.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Closed with every action drained.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state == ConnectionState::Closed && self.actions.is_empty()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Feed bytes read from the transport.
    pub fn receive(&mut self, data: &[u8]) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.buffer.extend(data);

        if self.state == ConnectionState::Connecting && !self.process_handshake() {
            return;
        }
        if self.state.can_receive() {
            self.read_frames();
        }
    }

    /// The transport reached EOF.
    pub fn transport_closed(&mut self) {
        let close = match self.state {
            ConnectionState::Closed => return,
            ConnectionState::Closing => self
                .pending_close
                .take()
                .unwrap_or_else(|| CloseFrame::new(CloseCode::Abnormal, "")),
            ConnectionState::Connecting | ConnectionState::Open => {
                CloseFrame::new(CloseCode::Abnormal, "")
            }
        };
        debug!(role = %self.role, state = %self.state, "transport closed");
        // nothing left to shut down
        self.shutdown_requested = true;
        self.finish(close);
    }

    /// The transport failed.
    pub fn transport_error(&mut self, err: Error) {
        if self.state == ConnectionState::Closed {
            return;
        }
        warn!(role = %self.role, error = %err, "transport error");
        self.actions.push_back(Action::Error(err));
        self.transport_closed();
    }

    /// Returns `true` once the connection is open.
    fn process_handshake(&mut self) -> bool {
        let max = self.buffer.max_len();
        let Some(end) = find_head_end(&self.buffer, self.head_scan) else {
            if self.buffer.len() > max {
                let size = self.buffer.len();
                self.fail_handshake(Error::HandshakeTooLarge { size, max });
            } else {
                self.head_scan = self.buffer.len();
            }
            return false;
        };
        if end > max {
            self.fail_handshake(Error::HandshakeTooLarge { size: end, max });
            return false;
        }

        match self.negotiate(end) {
            Ok((negotiated, response)) => {
                if let Some(response) = response {
                    self.actions.push_back(Action::Write(Bytes::from(response)));
                }
                self.buffer.consume(end);
                self.head_scan = 0;
                self.advance(ConnectionState::Open);
                self.protocol = negotiated.protocol.clone();
                debug!(
                    role = %self.role,
                    path = %negotiated.path,
                    protocol = ?negotiated.protocol,
                    "handshake complete"
                );
                self.actions.push_back(Action::Connected(negotiated));
                true
            }
            Err(err) => {
                self.fail_handshake(err);
                false
            }
        }
    }

    fn negotiate(&self, end: usize) -> Result<(Negotiated, Option<Vec<u8>>)> {
        let head = HttpHead::parse(&self.buffer[..end])?;
        match &self.endpoint {
            Endpoint::Client { request, key } => {
                let protocol = check_response(&head, key, &request.protocols)?;
                let negotiated = Negotiated {
                    protocol,
                    path: request.path.clone(),
                    headers: head.headers,
                };
                Ok((negotiated, None))
            }
            Endpoint::Server { selector } => {
                let request = HandshakeRequest::from_head(&head)?;
                let protocol = selector
                    .as_ref()
                    .and_then(|s| s.select(&request.protocols))
                    .filter(|chosen| {
                        let offered = request.protocols.contains(chosen);
                        if !offered {
                            warn!(protocol = %chosen, "selector returned a protocol the client did not offer");
                        }
                        offered
                    });
                let response = build_response(&request.key, protocol.as_deref())?;
                let negotiated = Negotiated {
                    protocol,
                    path: request.path,
                    headers: head.headers,
                };
                Ok((negotiated, Some(response)))
            }
        }
    }

    fn fail_handshake(&mut self, err: Error) {
        warn!(role = %self.role, error = %err, "handshake failed");
        if self.role == Role::Server {
            self.actions
                .push_back(Action::Write(Bytes::from_static(BAD_REQUEST)));
        }
        let close = CloseFrame::new(err.close_code(), "");
        self.actions.push_back(Action::Error(err));
        self.buffer.clear();
        self.finish(close);
    }

    fn read_frames(&mut self) {
        while self.state.can_receive() {
            match Frame::decode(&self.buffer, self.role) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.consume(consumed);
                    trace!(
                        role = %self.role,
                        opcode = %frame.opcode,
                        fin = frame.fin,
                        len = frame.payload.len(),
                        "frame"
                    );
                    self.dispatch(frame);
                }
                Ok(None) => break,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
            if let Err(err) = self.buffer.check_limit() {
                self.fail(err);
                return;
            }
        }
        if self.state.can_receive() {
            if let Err(err) = self.buffer.check_limit() {
                self.fail(err);
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        match frame.opcode {
            OpCode::Close => {
                let close = CloseFrame::from_payload(&frame.payload);
                if self.state == ConnectionState::Open {
                    let _ = self.write_frame(&Frame::close(&close));
                }
                debug!(
                    role = %self.role,
                    code = close.code.as_u16(),
                    reason = %close.reason,
                    "peer closed"
                );
                self.finish(close);
            }
            OpCode::Ping => {
                if self.state == ConnectionState::Open {
                    let _ = self.write_frame(&Frame::pong(frame.payload));
                }
            }
            OpCode::Pong => self.actions.push_back(Action::Pong(frame.payload)),
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                match self.assembler.push(frame) {
                    Ok(Assembled::Incomplete) => {}
                    Ok(Assembled::Text(text)) => self.actions.push_back(Action::Text(text)),
                    Ok(Assembled::Binary { first, fin, data }) => {
                        if first {
                            self.actions.push_back(Action::BinaryStart);
                        }
                        if !data.is_empty() {
                            self.actions.push_back(Action::BinaryChunk(data));
                        }
                        if fin {
                            self.actions.push_back(Action::BinaryEnd);
                        }
                    }
                    Err(err) => self.fail(err),
                }
            }
        }
    }

    /// Fatal failure on an established connection.
    fn fail(&mut self, err: Error) {
        let close = CloseFrame::new(err.close_code(), "");
        warn!(
            role = %self.role,
            state = %self.state,
            code = close.code.as_u16(),
            error = %err,
            "failing connection"
        );
        self.actions.push_back(Action::Error(err));
        if self.state == ConnectionState::Open {
            let _ = self.write_frame(&Frame::close(&close));
        }
        self.buffer.clear();
        self.finish(close);
    }

    fn finish(&mut self, close: CloseFrame) {
        let from = self.state;
        if self.advance(ConnectionState::Closed) {
            debug!(role = %self.role, %from, code = close.code.as_u16(), "closed");
        }
        if self.assembler.reset() {
            self.actions.push_back(Action::BinaryEnd);
        }
        self.outbound_stream = false;
        self.pending_close = None;
        if !self.close_notified {
            self.close_notified = true;
            self.actions.push_back(Action::Closed(close));
        }
        if !self.shutdown_requested {
            self.shutdown_requested = true;
            self.actions.push_back(Action::Shutdown);
        }
    }

    /// Move forward to `next`. Returns `false`, leaving the state alone, if
    /// that would not be a step forward.
    fn advance(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Queue `frame` for writing, masked when sent by a client.
    ///
    /// A client that cannot draw a mask key can send nothing at all, so the
    /// connection is dropped with 1006.
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = match self.role.must_mask().then(random_mask).transpose() {
            Ok(mask) => mask,
            Err(err) => {
                warn!(role = %self.role, error = %err, "no mask key available");
                self.actions.push_back(Action::Error(err.clone()));
                self.buffer.clear();
                self.finish(CloseFrame::new(CloseCode::Abnormal, ""));
                return Err(err);
            }
        };
        let mut buf = BytesMut::with_capacity(frame.wire_size(mask.is_some()));
        frame.encode(&mut buf, mask);
        self.actions.push_back(Action::Write(buf.freeze()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Report a usage error without touching connection state.
    fn reject(&mut self, err: Error) -> Result<()> {
        debug!(role = %self.role, state = %self.state, error = %err, "rejected");
        self.actions.push_back(Action::Error(err.clone()));
        Err(err)
    }

    fn check_can_send(&mut self) -> Result<()> {
        if !self.state.can_send() {
            return self.reject(Error::NotOpen(self.state));
        }
        if self.outbound_stream {
            return self.reject(Error::StreamInProgress);
        }
        Ok(())
    }

    /// Send a complete text message as one frame.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen` or `Error::StreamInProgress`; an `Action::Error` is
    /// queued as well.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.check_can_send()?;
        self.write_frame(&Frame::text(Bytes::copy_from_slice(text.as_bytes())))
    }

    /// Send a complete binary message as one frame.
    ///
    /// # Errors
    ///
    /// Same as [`Session::send_text`].
    pub fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.check_can_send()?;
        self.write_frame(&Frame::binary(data))
    }

    /// Send a text or binary message.
    ///
    /// # Errors
    ///
    /// Same as [`Session::send_text`].
    pub fn send(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Text(text) => self.send_text(&text),
            Message::Binary(data) => self.send_binary(data),
        }
    }

    /// Send a ping. Allowed while an outbound stream is active.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen`, or `Error::ControlFrameTooLarge` above 125 bytes.
    pub fn send_ping(&mut self, data: Bytes) -> Result<()> {
        if !self.state.can_send() {
            return self.reject(Error::NotOpen(self.state));
        }
        if data.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return self.reject(Error::ControlFrameTooLarge(data.len() as u64));
        }
        self.write_frame(&Frame::ping(data))
    }

    /// Claim the outbound stream slot.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen`, or `Error::StreamInProgress` if the slot is taken.
    pub fn begin_stream(&mut self) -> Result<()> {
        self.check_can_send()?;
        self.outbound_stream = true;
        debug!(role = %self.role, "outbound stream started");
        Ok(())
    }

    /// Write one fragment of the outbound stream.
    ///
    /// The final fragment releases the slot even when nothing is written.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen` if the connection left the open state or the slot
    /// was released by a close; the fragment is dropped.
    pub fn stream_frame(&mut self, payload: Bytes, first: bool, fin: bool) -> Result<()> {
        let writable = self.state.can_send() && self.outbound_stream;
        if fin {
            self.outbound_stream = false;
        }
        if !writable {
            trace!(role = %self.role, state = %self.state, "dropping stream fragment");
            return Err(Error::NotOpen(self.state));
        }
        let opcode = if first {
            OpCode::Binary
        } else {
            OpCode::Continuation
        };
        self.write_frame(&Frame::new(fin, opcode, payload))?;
        if fin {
            debug!(role = %self.role, "outbound stream finished");
        }
        Ok(())
    }

    /// Close the connection.
    ///
    /// While open a close frame is sent first. Unless
    /// [`Config::await_close_echo`] is set the connection is closed at once;
    /// otherwise it waits in `Closing` for the peer's close frame. Calling
    /// close while closing forces the close; on a closed connection it is a
    /// no-op.
    pub fn close(&mut self, code: CloseCode, reason: &str) {
        let close = CloseFrame::new(code, reason);
        match self.state {
            ConnectionState::Open => {
                if self.write_frame(&Frame::close(&close)).is_err() {
                    return;
                }
                if self.config.await_close_echo && self.advance(ConnectionState::Closing) {
                    debug!(role = %self.role, code = code.as_u16(), "closing, awaiting echo");
                    self.pending_close = Some(close);
                } else {
                    self.finish(close);
                }
            }
            ConnectionState::Connecting => self.finish(close),
            ConnectionState::Closing => {
                let close = self.pending_close.take().unwrap_or(close);
                self.finish(close);
            }
            ConnectionState::Closed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AllowedProtocols;

    fn drain(session: &mut Session) -> Vec<Action> {
        std::iter::from_fn(|| session.poll_action()).collect()
    }

    fn written(actions: &[Action]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Write(bytes) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn events(actions: Vec<Action>) -> Vec<Action> {
        actions
            .into_iter()
            .filter(|a| !matches!(a, Action::Write(_)))
            .collect()
    }

    fn pair_with(request: ClientRequest, server: Session, config: Config) -> (Session, Session) {
        let mut client = Session::client(request, config).unwrap();
        let mut server = server;

        let request = written(&drain(&mut client));
        server.receive(&request);
        let actions = drain(&mut server);
        assert!(actions.iter().any(|a| matches!(a, Action::Connected(_))));

        client.receive(&written(&actions));
        let actions = drain(&mut client);
        assert!(matches!(actions.as_slice(), [Action::Connected(_)]));

        (client, server)
    }

    fn pair() -> (Session, Session) {
        pair_with(
            ClientRequest::new("localhost", "/"),
            Session::server(None, Config::default()),
            Config::default(),
        )
    }

    fn masked(frame: Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf, Some([0x11, 0x22, 0x33, 0x44]));
        buf.to_vec()
    }

    #[test]
    fn test_handshake_opens_both_sides() {
        let (client, server) = pair();
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(server.state(), ConnectionState::Open);
        assert_eq!(client.protocol(), None);
    }

    #[test]
    fn test_handshake_byte_by_byte() {
        let mut client = Session::client(ClientRequest::new("localhost", "/x"), Config::default())
            .unwrap();
        let mut server = Session::server(None, Config::default());

        let request = written(&drain(&mut client));
        for byte in &request {
            assert_eq!(server.state(), ConnectionState::Connecting);
            server.receive(std::slice::from_ref(byte));
        }
        assert_eq!(server.state(), ConnectionState::Open);
        let actions = drain(&mut server);
        match &actions[1] {
            Action::Connected(negotiated) => {
                assert_eq!(negotiated.path, "/x");
                assert_eq!(negotiated.headers.get("host").map(String::as_str), Some("localhost"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_protocol_negotiation() {
        let selector: Arc<dyn ProtocolSelector> = Arc::new(AllowedProtocols::new(["chatv1"]));
        let (client, server) = pair_with(
            ClientRequest::new("localhost", "/chat").with_protocols(["chatv2", "chatv1"]),
            Session::server(Some(selector), Config::default()),
            Config::default(),
        );
        assert_eq!(client.protocol(), Some("chatv1"));
        assert_eq!(server.protocol(), Some("chatv1"));
    }

    #[test]
    fn test_selector_cannot_invent_protocol() {
        let selector: Arc<dyn ProtocolSelector> =
            Arc::new(|_: &[String]| Some("invented".to_string()));
        let mut server = Session::server(Some(selector), Config::default());
        let mut client = Session::client(
            ClientRequest::new("localhost", "/").with_protocols(["real"]),
            Config::default(),
        )
        .unwrap();
        server.receive(&written(&drain(&mut client)));
        assert_eq!(server.state(), ConnectionState::Open);
        assert_eq!(server.protocol(), None);
    }

    #[test]
    fn test_invalid_request_gets_bad_request() {
        let mut server = Session::server(None, Config::default());
        server.receive(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        let actions = drain(&mut server);
        assert_eq!(actions[0], Action::Write(Bytes::from_static(BAD_REQUEST)));
        assert!(matches!(actions[1], Action::Error(Error::InvalidHandshake(_))));
        assert_eq!(
            actions[2],
            Action::Closed(CloseFrame::new(CloseCode::ProtocolError, ""))
        );
        assert_eq!(actions[3], Action::Shutdown);
        assert!(server.is_terminated());
    }

    #[test]
    fn test_client_rejects_bad_response_without_writing() {
        let mut client =
            Session::client(ClientRequest::new("localhost", "/"), Config::default()).unwrap();
        drain(&mut client);
        client.receive(b"HTTP/1.1 403 Forbidden\r\n\r\n");
        let actions = drain(&mut client);
        assert!(written(&actions).is_empty());
        assert!(matches!(actions[0], Action::Error(Error::InvalidHandshake(_))));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_handshake_overflow() {
        let mut server = Session::server(None, Config::default().with_max_buffer_length(32));
        server.receive(&[b'a'; 40]);
        let actions = drain(&mut server);
        assert_eq!(actions[0], Action::Write(Bytes::from_static(BAD_REQUEST)));
        assert_eq!(
            actions[1],
            Action::Error(Error::HandshakeTooLarge { size: 40, max: 32 })
        );
        assert_eq!(
            actions[2],
            Action::Closed(CloseFrame::new(CloseCode::MessageTooBig, ""))
        );
    }

    #[test]
    fn test_client_handshake_overflow_without_terminator() {
        let config = Config::default().with_max_buffer_length(64);
        let mut client = Session::client(ClientRequest::new("localhost", "/"), config).unwrap();
        drain(&mut client);

        client.receive(&[b'a'; 48]);
        assert!(drain(&mut client).is_empty());
        client.receive(&[b'a'; 32]);
        assert_eq!(
            drain(&mut client),
            vec![
                Action::Error(Error::HandshakeTooLarge { size: 80, max: 64 }),
                Action::Closed(CloseFrame::new(CloseCode::MessageTooBig, "")),
                Action::Shutdown,
            ]
        );
        assert!(client.is_terminated());
    }

    #[test]
    fn test_client_rejects_complete_head_above_limit() {
        let response: &[u8] =
            b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        let config = Config::default().with_max_buffer_length(64);
        let mut client = Session::client(ClientRequest::new("localhost", "/"), config).unwrap();
        drain(&mut client);

        client.receive(response);
        assert_eq!(
            drain(&mut client),
            vec![
                Action::Error(Error::HandshakeTooLarge {
                    size: response.len(),
                    max: 64
                }),
                Action::Closed(CloseFrame::new(CloseCode::MessageTooBig, "")),
                Action::Shutdown,
            ]
        );
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_server_head_limit_is_inclusive() {
        let mut client =
            Session::client(ClientRequest::new("localhost", "/"), Config::default()).unwrap();
        let request = written(&drain(&mut client));

        let mut at_limit =
            Session::server(None, Config::default().with_max_buffer_length(request.len()));
        at_limit.receive(&request);
        assert_eq!(at_limit.state(), ConnectionState::Open);

        let max = request.len() - 1;
        let mut over = Session::server(None, Config::default().with_max_buffer_length(max));
        over.receive(&request);
        let actions = drain(&mut over);
        assert_eq!(actions[0], Action::Write(Bytes::from_static(BAD_REQUEST)));
        assert_eq!(
            actions[1],
            Action::Error(Error::HandshakeTooLarge {
                size: request.len(),
                max
            })
        );
        assert_eq!(
            actions[2],
            Action::Closed(CloseFrame::new(CloseCode::MessageTooBig, ""))
        );
    }

    #[test]
    fn test_frames_after_head_in_same_read() {
        let mut client =
            Session::client(ClientRequest::new("localhost", "/"), Config::default()).unwrap();
        let mut server = Session::server(None, Config::default());
        let mut bytes = written(&drain(&mut client));
        bytes.extend(masked(Frame::text(Bytes::from_static(b"early"))));
        server.receive(&bytes);
        let actions = events(drain(&mut server));
        assert!(matches!(actions[0], Action::Connected(_)));
        assert_eq!(actions[1], Action::Text("early".into()));
    }

    #[test]
    fn test_peer_close_with_reason() {
        let (_client, mut server) = pair();
        let mut payload = vec![0x03, 0xE8];
        payload.extend_from_slice(b"bye");
        server.receive(&masked(Frame::new(true, OpCode::Close, payload.clone())));

        let actions = drain(&mut server);
        let mut echo = vec![0x88, 0x05];
        echo.extend_from_slice(&payload);
        assert_eq!(actions[0], Action::Write(Bytes::from(echo)));
        assert_eq!(
            actions[1],
            Action::Closed(CloseFrame::new(CloseCode::Normal, "bye"))
        );
        assert_eq!(actions[2], Action::Shutdown);
        assert_eq!(server.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_peer_close_without_code() {
        let (_client, mut server) = pair();
        server.receive(&masked(Frame::new(true, OpCode::Close, Bytes::new())));
        let actions = drain(&mut server);
        // echo carries no code either
        assert_eq!(actions[0], Action::Write(Bytes::from_static(&[0x88, 0x00])));
        assert_eq!(
            actions[1],
            Action::Closed(CloseFrame::new(CloseCode::NoStatusReceived, ""))
        );
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let (mut client, mut server) = pair();
        client.send_ping(Bytes::from_static(b"hb")).unwrap();
        server.receive(&written(&drain(&mut client)));
        let actions = drain(&mut server);
        assert_eq!(actions, vec![Action::Write(Bytes::from_static(&[0x8A, 0x02, b'h', b'b']))]);

        client.receive(&written(&actions));
        assert_eq!(
            drain(&mut client),
            vec![Action::Pong(Bytes::from_static(b"hb"))]
        );
    }

    #[test]
    fn test_interleaved_fragments_fail_with_1002() {
        let (_client, mut server) = pair();
        let mut bytes = masked(Frame::new(false, OpCode::Text, Bytes::from_static(b"a")));
        bytes.extend(masked(Frame::new(true, OpCode::Binary, Bytes::from_static(b"b"))));
        server.receive(&bytes);

        let actions = drain(&mut server);
        assert!(matches!(actions[0], Action::Error(Error::ProtocolViolation(_))));
        assert_eq!(
            actions[1],
            Action::Write(Bytes::from_static(&[0x88, 0x02, 0x03, 0xEA]))
        );
        assert_eq!(
            actions[2],
            Action::Closed(CloseFrame::new(CloseCode::ProtocolError, ""))
        );
        assert_eq!(actions[3], Action::Shutdown);
    }

    #[test]
    fn test_unmasked_frame_to_server_fails() {
        let (_client, mut server) = pair();
        server.receive(&[0x81, 0x00]);
        let actions = events(drain(&mut server));
        assert_eq!(actions[0], Action::Error(Error::UnmaskedClientFrame));
        assert_eq!(
            actions[1],
            Action::Closed(CloseFrame::new(CloseCode::ProtocolError, ""))
        );
    }

    #[test]
    fn test_invalid_utf8_closes_with_1007() {
        let (_client, mut server) = pair();
        server.receive(&masked(Frame::text(Bytes::from_static(&[0xC3, 0x28]))));
        let actions = events(drain(&mut server));
        assert_eq!(actions[0], Action::Error(Error::InvalidUtf8));
        assert_eq!(
            actions[1],
            Action::Closed(CloseFrame::new(CloseCode::InvalidPayload, ""))
        );
    }

    #[test]
    fn test_buffer_overflow_closes_with_1009() {
        let config = Config::default().with_max_buffer_length(256);
        let mut server = Session::server(None, config.clone());
        let mut client = Session::client(ClientRequest::new("h", "/"), config).unwrap();
        server.receive(&written(&drain(&mut client)));
        drain(&mut server);

        // declares 400 bytes, delivers 300: incomplete and already too big
        let wire = masked(Frame::binary(vec![0u8; 400]));
        server.receive(&wire[..300]);
        let actions = events(drain(&mut server));
        assert_eq!(
            actions[0],
            Action::Error(Error::BufferOverflow { size: 300, max: 256 })
        );
        assert_eq!(
            actions[1],
            Action::Closed(CloseFrame::new(CloseCode::MessageTooBig, ""))
        );
    }

    #[test]
    fn test_binary_fragments_stream_through() {
        let (mut client, mut server) = pair();
        client.begin_stream().unwrap();
        client
            .stream_frame(Bytes::from_static(b"ab"), true, false)
            .unwrap();
        client
            .stream_frame(Bytes::from_static(b"cd"), false, true)
            .unwrap();
        assert!(!client.has_outbound_stream());

        server.receive(&written(&drain(&mut client)));
        assert_eq!(
            drain(&mut server),
            vec![
                Action::BinaryStart,
                Action::BinaryChunk(Bytes::from_static(b"ab")),
                Action::BinaryChunk(Bytes::from_static(b"cd")),
                Action::BinaryEnd,
            ]
        );
    }

    #[test]
    fn test_close_ends_inbound_stream() {
        let (_client, mut server) = pair();
        server.receive(&masked(Frame::new(false, OpCode::Binary, Bytes::from_static(b"x"))));
        drain(&mut server);
        server.transport_closed();
        assert_eq!(
            drain(&mut server),
            vec![
                Action::BinaryEnd,
                Action::Closed(CloseFrame::new(CloseCode::Abnormal, "")),
            ]
        );
    }

    #[test]
    fn test_usage_errors_leave_state_alone() {
        let (mut client, _server) = pair();
        client.begin_stream().unwrap();

        assert_eq!(client.send_text("x"), Err(Error::StreamInProgress));
        assert_eq!(client.begin_stream(), Err(Error::StreamInProgress));
        assert_eq!(
            drain(&mut client),
            vec![
                Action::Error(Error::StreamInProgress),
                Action::Error(Error::StreamInProgress),
            ]
        );
        assert_eq!(client.state(), ConnectionState::Open);
        // pings may interleave with a stream
        assert!(client.send_ping(Bytes::new()).is_ok());
    }

    #[test]
    fn test_send_before_open_rejected() {
        let mut client =
            Session::client(ClientRequest::new("localhost", "/"), Config::default()).unwrap();
        drain(&mut client);
        assert_eq!(
            client.send_text("early"),
            Err(Error::NotOpen(ConnectionState::Connecting))
        );
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_local_close_is_immediate_by_default() {
        let (mut client, _server) = pair();
        client.close(CloseCode::Normal, "done");
        let actions = drain(&mut client);
        assert!(matches!(actions[0], Action::Write(_)));
        assert_eq!(
            actions[1],
            Action::Closed(CloseFrame::new(CloseCode::Normal, "done"))
        );
        assert_eq!(actions[2], Action::Shutdown);

        client.close(CloseCode::Normal, "again");
        assert!(drain(&mut client).is_empty());
        assert_eq!(client.send_text("late"), Err(Error::NotOpen(ConnectionState::Closed)));
    }

    #[test]
    fn test_strict_close_waits_for_echo() {
        let config = Config::default().with_await_close_echo(true);
        let (mut client, mut server) = pair_with(
            ClientRequest::new("localhost", "/"),
            Session::server(None, Config::default()),
            config,
        );
        client.close(CloseCode::GoingAway, "later");
        assert_eq!(client.state(), ConnectionState::Closing);

        server.receive(&written(&drain(&mut client)));
        let echo = written(&drain(&mut server));
        client.receive(&echo);
        assert_eq!(
            events(drain(&mut client)),
            vec![
                Action::Closed(CloseFrame::new(CloseCode::GoingAway, "later")),
                Action::Shutdown,
            ]
        );
    }

    #[test]
    fn test_closed_session_stays_closed() {
        let config = Config::default().with_await_close_echo(true);
        let (mut client, _server) = pair_with(
            ClientRequest::new("localhost", "/"),
            Session::server(None, Config::default()),
            config,
        );
        client.close(CloseCode::Normal, "");
        drain(&mut client);
        assert_eq!(client.state(), ConnectionState::Closing);

        client.transport_closed();
        drain(&mut client);
        assert_eq!(client.state(), ConnectionState::Closed);

        let mut late_echo = BytesMut::new();
        Frame::close(&CloseFrame::new(CloseCode::Normal, "")).encode(&mut late_echo, None);
        client.close(CloseCode::GoingAway, "again");
        client.receive(&late_echo);
        assert!(drain(&mut client).is_empty());
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_stream_frame_after_close_releases_slot() {
        let (mut client, _server) = pair();
        client.begin_stream().unwrap();
        client.close(CloseCode::Normal, "");
        drain(&mut client);
        assert!(client.stream_frame(Bytes::from_static(b"x"), true, true).is_err());
        assert!(!client.has_outbound_stream());
        assert!(drain(&mut client).is_empty());
    }

    #[test]
    fn test_transport_closed_while_open() {
        let (mut client, _server) = pair();
        client.transport_closed();
        assert_eq!(
            drain(&mut client),
            vec![Action::Closed(CloseFrame::new(CloseCode::Abnormal, ""))]
        );
        client.transport_closed();
        assert!(drain(&mut client).is_empty());
    }
}
