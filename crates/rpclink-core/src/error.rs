use std::sync::Arc;

/// Outcome of a failed write, delivered to the request's ack sink.
///
/// Cloneable so the same failure can be handed to the ack and to the
/// error reporter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteError {
    /// The connection accepted fewer bytes than the payload length.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The connection reported an I/O error.
    #[error("transport error: {0}")]
    Transport(Arc<std::io::Error>),
}

impl WriteError {
    /// The I/O error kind, if this is a transport failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Transport(err) => Some(err.kind()),
            Self::ShortWrite { .. } => None,
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

/// Errors that can occur while binding or running a duplex link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A write request failed; the link is closed afterward.
    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    /// The connection failed outside the write path (cloning, closing).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The protocol handler failed to initialize or decode a message.
    #[error("protocol handler error: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// `start` was called before `bind`.
    #[error("link has no bound connection")]
    NotBound,

    /// `bind` was called more than once.
    #[error("link is already bound")]
    AlreadyBound,

    /// `start` was called more than once.
    #[error("link is already started")]
    AlreadyStarted,

    /// A loop thread could not be spawned.
    #[error("failed to spawn {role} loop: {source}")]
    Spawn {
        role: &'static str,
        source: std::io::Error,
    },
}

impl LinkError {
    pub(crate) fn handler<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
