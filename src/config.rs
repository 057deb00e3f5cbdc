//! Configuration for WebSocket connections.
//!
//! The fragmentation threshold and the receive-buffer ceiling have
//! process-wide defaults that [`Config::default`] picks up. Changing a
//! default only affects configurations created afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Built-in fragmentation threshold for streamed binary messages (512 KiB).
pub const DEFAULT_FRAGMENT_SIZE: usize = 512 * 1024;

/// Built-in receive-buffer ceiling (2 MiB).
pub const DEFAULT_MAX_BUFFER_LENGTH: usize = 2 * 1024 * 1024;

static FRAGMENT_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_FRAGMENT_SIZE);
static MAX_BUFFER_LENGTH: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_BUFFER_LENGTH);

/// Current process-wide fragmentation threshold.
#[must_use]
pub fn default_fragment_size() -> usize {
    FRAGMENT_SIZE.load(Ordering::Relaxed)
}

/// Replace the process-wide fragmentation threshold. Zero is raised to one.
pub fn set_default_fragment_size(size: usize) {
    FRAGMENT_SIZE.store(size.max(1), Ordering::Relaxed);
}

/// Current process-wide receive-buffer ceiling.
#[must_use]
pub fn default_max_buffer_length() -> usize {
    MAX_BUFFER_LENGTH.load(Ordering::Relaxed)
}

/// Replace the process-wide receive-buffer ceiling.
pub fn set_default_max_buffer_length(len: usize) {
    MAX_BUFFER_LENGTH.store(len, Ordering::Relaxed);
}

/// WebSocket connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fragmentation threshold for streamed binary messages (in bytes).
    ///
    /// An outbound stream emits a frame of exactly this size whenever more
    /// than this many bytes are buffered.
    ///
    /// Default: process-wide default, initially 512 KiB
    pub fragment_size: usize,

    /// Maximum number of bytes the receive buffer may hold (in bytes).
    ///
    /// Exceeding it closes the connection with 1009. The same ceiling caps a
    /// reassembled text message.
    ///
    /// Default: process-wide default, initially 2 MiB
    pub max_buffer_length: usize,

    /// Bytes requested from the transport per read.
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Capacity of the event channel handed to the host.
    ///
    /// Default: 64
    pub event_capacity: usize,

    /// Capacity, in chunks, of an inbound binary stream.
    ///
    /// A full stream pauses transport reads until the consumer catches up.
    ///
    /// Default: 16
    pub stream_capacity: usize,

    /// Wait for the peer's close frame before reporting a local close.
    ///
    /// When `false`, a local close sends the close frame, reports the close
    /// and shuts the transport down at once.
    ///
    /// Default: false
    pub await_close_echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fragment_size: default_fragment_size(),
            max_buffer_length: default_max_buffer_length(),
            read_buffer_size: 8192,
            event_capacity: 64,
            stream_capacity: 16,
            await_close_echo: false,
        }
    }
}

impl Config {
    /// Create a new configuration from the process-wide defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fragmentation threshold for streamed binary messages.
    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = if size == 0 { 1 } else { size };
        self
    }

    /// Set the receive-buffer ceiling.
    #[must_use]
    pub const fn with_max_buffer_length(mut self, len: usize) -> Self {
        self.max_buffer_length = len;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the inbound stream capacity.
    #[must_use]
    pub const fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    /// Opt into the strict closing handshake.
    #[must_use]
    pub const fn with_await_close_echo(mut self, wait: bool) -> Self {
        self.await_close_echo = wait;
        self
    }
}
