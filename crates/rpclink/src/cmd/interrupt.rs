use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rpclink_core::CloseHandle;
use rpclink_transport::TcpTransport;

use crate::exit::{CliError, CliResult, INTERNAL};

/// Ctrl-C state shared by a server loop and its live sessions.
///
/// Interrupting marks the loop stopped and closes every tracked session, then
/// pokes the listener so a blocked accept returns.
#[derive(Clone, Default)]
pub struct Interrupt {
    stopped: Arc<AtomicBool>,
    live: Arc<Mutex<Vec<CloseHandle>>>,
}

impl Interrupt {
    pub fn install(wake: SocketAddr) -> CliResult<Self> {
        let interrupt = Self::default();
        let handler = interrupt.clone();
        ctrlc::set_handler(move || {
            handler.trigger();
            let _ = TcpTransport::connect(wake);
        })
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
        Ok(interrupt)
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Close `handle` on interrupt. Closes it at once if already interrupted.
    pub fn track(&self, handle: CloseHandle) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|tracked| !tracked.is_closed());
        if self.is_running() {
            live.push(handle);
        } else {
            handle.close();
        }
    }

    fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(sessions = live.len(), "interrupted, closing sessions");
        for handle in live.iter() {
            handle.close();
        }
    }
}
