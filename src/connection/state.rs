//! Connection lifecycle states.

/// WebSocket connection state.
///
/// States are ordered; a connection only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionState {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Handshake done; data flows both ways.
    Open,
    /// Close frame sent, waiting for the peer's.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if sending data is allowed in this state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if frames are still decoded in this state.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// Whether moving to `next` keeps the lifecycle monotonic.
    #[must_use]
    pub fn can_advance_to(&self, next: ConnectionState) -> bool {
        next > *self
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn test_can_send_in_each_state() {
        assert!(!ConnectionState::Connecting.can_send());
        assert!(ConnectionState::Open.can_send());
        assert!(!ConnectionState::Closing.can_send());
        assert!(!ConnectionState::Closed.can_send());
    }

    #[test]
    fn test_can_receive_in_each_state() {
        assert!(!ConnectionState::Connecting.can_receive());
        assert!(ConnectionState::Open.can_receive());
        assert!(ConnectionState::Closing.can_receive());
        assert!(!ConnectionState::Closed.can_receive());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use ConnectionState::*;
        assert!(Connecting.can_advance_to(Open));
        assert!(Connecting.can_advance_to(Closed));
        assert!(Open.can_advance_to(Closing));
        assert!(Closing.can_advance_to(Closed));
        assert!(!Open.can_advance_to(Connecting));
        assert!(!Closed.can_advance_to(Open));
        assert!(!Closed.can_advance_to(Closed));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
