//! Server-side sub-protocol selection.

/// Chooses at most one sub-protocol from those a client offered.
///
/// One selector is shared, read-only, by every connection an
/// [`Acceptor`](crate::connection::Acceptor) creates.
pub trait ProtocolSelector: Send + Sync {
    /// Pick a protocol from `offered` (in the client's order), or `None`.
    fn select(&self, offered: &[String]) -> Option<String>;
}

impl<F> ProtocolSelector for F
where
    F: Fn(&[String]) -> Option<String> + Send + Sync,
{
    fn select(&self, offered: &[String]) -> Option<String> {
        self(offered)
    }
}

/// Selector backed by a list of protocols the server speaks.
///
/// The client's preference wins: the first offered protocol that is also
/// in the list is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedProtocols(Vec<String>);

impl AllowedProtocols {
    #[must_use]
    pub fn new<I, S>(protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(protocols.into_iter().map(Into::into).collect())
    }
}

impl ProtocolSelector for AllowedProtocols {
    fn select(&self, offered: &[String]) -> Option<String> {
        offered.iter().find(|p| self.0.contains(p)).cloned()
    }
}
