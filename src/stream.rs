//! Streamed binary messages.
//!
//! Outbound, a [`Coalescer`] turns arbitrarily sized writes into
//! threshold-sized fragments; [`OutboundStream`] feeds those fragments to a
//! connection one at a time, waiting for each to reach the transport.
//! Inbound, an [`InboundStream`] yields the chunks of one binary message in
//! order and ends with the message's final frame.

use bytes::{Bytes, BytesMut};

/// One frame's worth of an outbound binary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Frame payload.
    pub payload: Bytes,
    /// First frame of the message (sent as Binary, later ones as Continuation).
    pub first: bool,
    /// Last frame of the message.
    pub fin: bool,
}

/// Accumulates writes and cuts them into fragments.
///
/// Whenever more than `threshold` bytes are buffered, exactly `threshold`
/// bytes are cut off as a non-final fragment. [`Coalescer::finish`] emits
/// whatever is left as the final fragment, possibly empty.
#[derive(Debug)]
pub struct Coalescer {
    buffer: BytesMut,
    threshold: usize,
    first_sent: bool,
}

impl Coalescer {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            threshold: threshold.max(1),
            first_sent: false,
        }
    }

    /// Buffer `chunk`, returning any fragments that became ready.
    pub fn write(&mut self, chunk: &[u8]) -> Vec<Fragment> {
        self.buffer.extend_from_slice(chunk);
        let mut ready = Vec::new();
        while self.buffer.len() > self.threshold {
            let payload = self.buffer.split_to(self.threshold).freeze();
            ready.push(self.fragment(payload, false));
        }
        ready
    }

    /// The final fragment.
    pub fn finish(&mut self) -> Fragment {
        let payload = self.buffer.split().freeze();
        self.fragment(payload, true)
    }

    /// Bytes waiting for the next fragment.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn fragment(&mut self, payload: Bytes, fin: bool) -> Fragment {
        let first = !self.first_sent;
        self.first_sent = true;
        Fragment {
            payload,
            first,
            fin,
        }
    }
}

#[cfg(feature = "async-tokio")]
pub use self::io::{InboundStream, OutboundStream};

#[cfg(feature = "async-tokio")]
mod io {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::{Bytes, BytesMut};
    use tokio::sync::{mpsc, oneshot};

    use super::{Coalescer, Fragment};
    use crate::connection::Command;
    use crate::error::{Error, Result};

    /// Sending half of a streamed binary message.
    ///
    /// Obtained from [`Connection::begin_binary`](crate::Connection::begin_binary).
    /// Each [`write`](OutboundStream::write) resolves once every fragment it
    /// completed has been written to the transport. Dropping the stream
    /// without calling [`finish`](OutboundStream::finish) still sends the
    /// buffered remainder as the final frame.
    pub struct OutboundStream {
        commands: mpsc::UnboundedSender<Command>,
        coalescer: Coalescer,
        finished: bool,
    }

    impl OutboundStream {
        pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, threshold: usize) -> Self {
            Self {
                commands,
                coalescer: Coalescer::new(threshold),
                finished: false,
            }
        }

        /// Append bytes to the message.
        ///
        /// # Errors
        ///
        /// `Error::NotOpen` once the connection has left the open state, or
        /// `Error::ConnectionClosed` if the connection task is gone.
        pub async fn write(&mut self, chunk: impl AsRef<[u8]>) -> Result<()> {
            for fragment in self.coalescer.write(chunk.as_ref()) {
                self.send(fragment).await?;
            }
            Ok(())
        }

        /// Send the remainder as the final frame and release the connection's
        /// stream slot.
        ///
        /// # Errors
        ///
        /// Same as [`OutboundStream::write`].
        pub async fn finish(mut self) -> Result<()> {
            self.finished = true;
            let last = self.coalescer.finish();
            self.send(last).await
        }

        async fn send(&self, fragment: Fragment) -> Result<()> {
            let (done, ack) = oneshot::channel();
            self.commands
                .send(Command::StreamFrame {
                    fragment,
                    done: Some(done),
                })
                .map_err(|_| Error::ConnectionClosed)?;
            ack.await.map_err(|_| Error::ConnectionClosed)?
        }
    }

    impl Drop for OutboundStream {
        fn drop(&mut self) {
            if !self.finished {
                let last = self.coalescer.finish();
                let _ = self.commands.send(Command::StreamFrame {
                    fragment: last,
                    done: None,
                });
            }
        }
    }

    impl std::fmt::Debug for OutboundStream {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OutboundStream")
                .field("buffered", &self.coalescer.buffered())
                .field("finished", &self.finished)
                .finish()
        }
    }

    /// Receiving half of a streamed binary message.
    ///
    /// Chunks arrive in frame order. The stream ends after the message's
    /// final frame, or early if the connection closes mid-message. While the
    /// stream's buffer is full the connection stops reading the transport.
    pub struct InboundStream {
        chunks: mpsc::Receiver<Bytes>,
    }

    impl InboundStream {
        pub(crate) fn new(chunks: mpsc::Receiver<Bytes>) -> Self {
            Self { chunks }
        }

        /// Next chunk, or `None` at the end of the message.
        pub async fn next_chunk(&mut self) -> Option<Bytes> {
            self.chunks.recv().await
        }

        /// Collect the remaining chunks into one buffer.
        pub async fn read_to_end(mut self) -> Bytes {
            let mut data = BytesMut::new();
            while let Some(chunk) = self.chunks.recv().await {
                data.extend_from_slice(&chunk);
            }
            data.freeze()
        }
    }

    impl futures_core::Stream for InboundStream {
        type Item = Bytes;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
            self.chunks.poll_recv(cx)
        }
    }

    impl std::fmt::Debug for InboundStream {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("InboundStream").finish_non_exhaustive()
        }
    }
}
