use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use rpclink_transport::Connection;
use tracing::{debug, warn};

/// Lifecycle state of a duplex link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection attached yet.
    Unbound,
    /// Connection attached, loops not started.
    Bound,
    /// Both loops running, connection usable.
    Open,
    /// Close has been issued and the connection shutdown is in progress.
    Closing,
    /// Terminal. The connection is shut down.
    Closed,
}

const BOUND: u8 = 1;
const OPEN: u8 = 2;
const CLOSING: u8 = 3;
const CLOSED: u8 = 4;

impl LinkState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            BOUND => LinkState::Bound,
            OPEN => LinkState::Open,
            CLOSING => LinkState::Closing,
            CLOSED => LinkState::Closed,
            _ => LinkState::Unbound,
        }
    }
}

/// Close-once guard in front of the connection's shutdown.
///
/// Only the first caller to win the transition into `Closing` shuts the
/// connection down; every later call returns immediately.
pub(crate) struct CloseGate<C> {
    state: AtomicU8,
    conn: C,
    name: String,
}

impl<C: Connection> CloseGate<C> {
    pub(crate) fn new(conn: C, name: String) -> Self {
        Self {
            state: AtomicU8::new(BOUND),
            conn,
            name,
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        LinkState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Bound -> Open. No effect if the link was closed before starting.
    pub(crate) fn mark_open(&self) {
        let _ = self
            .state
            .compare_exchange(BOUND, OPEN, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Returns `true` for the call that actually shut the connection down.
    pub(crate) fn close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= CLOSING {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                CLOSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if let Err(err) = self.conn.shutdown() {
            warn!(link = %self.name, error = %err, "connection shutdown failed");
        }
        self.state.store(CLOSED, Ordering::Release);
        debug!(link = %self.name, "link closed");
        true
    }
}

trait Closable: Send + Sync {
    fn close(&self) -> bool;
    fn state(&self) -> LinkState;
}

impl<C: Connection> Closable for CloseGate<C> {
    fn close(&self) -> bool {
        CloseGate::close(self)
    }

    fn state(&self) -> LinkState {
        CloseGate::state(self)
    }
}

/// Cloneable handle that closes a link from anywhere.
#[derive(Clone)]
pub struct CloseHandle {
    gate: Arc<dyn Closable>,
}

impl CloseHandle {
    pub(crate) fn new<C: Connection>(gate: Arc<CloseGate<C>>) -> Self {
        Self { gate }
    }

    /// Close the link. Idempotent.
    pub fn close(&self) {
        self.gate.close();
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.gate.state()
    }

    /// Whether the connection has been closed (or is closing).
    pub fn is_closed(&self) -> bool {
        matches!(self.state(), LinkState::Closing | LinkState::Closed)
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("state", &self.state())
            .finish()
    }
}
