use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::BytesMut;
use crossbeam_channel::{select, Receiver, Sender};
use rpclink_transport::{Connection, LinkStream};
use tracing::{debug, trace, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result, WriteError};
use crate::gate::{CloseGate, CloseHandle, LinkState};
use crate::handler::ProtocolHandler;
use crate::report::{Direction, ErrorReporter, TracingReporter};
use crate::request::WriteRequest;

const DEFAULT_TRANSPORT: &str = "tcp";

type Task = Box<dyn FnOnce() + Send + 'static>;

/// One stream connection paired with one protocol handler and its two I/O
/// loops.
///
/// Lifecycle: [`bind`](Self::bind) once, [`start`](Self::start) once, then
/// the link runs until either loop fails or the owner calls
/// [`close`](Self::close). Either loop failing closes the connection, which
/// makes the other loop's blocked I/O fail in turn. Dropping the link stops
/// the write loop and closes the connection; it does not wait for the loops.
pub struct DuplexLink<H, C = LinkStream>
where
    C: Connection,
{
    config: LinkConfig,
    handler: Option<H>,
    conn: Option<C>,
    gate: Option<Arc<CloseGate<C>>>,
    transport: &'static str,
    reporter: Arc<dyn ErrorReporter>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    started: bool,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
}

impl<H, C> DuplexLink<H, C>
where
    H: ProtocolHandler,
    C: Connection,
{
    /// Create a link around `handler` with default configuration.
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, LinkConfig::default())
    }

    /// Create a link around `handler` with explicit configuration.
    pub fn with_config(handler: H, config: LinkConfig) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        Self {
            config,
            handler: Some(handler),
            conn: None,
            gate: None,
            transport: DEFAULT_TRANSPORT,
            reporter: Arc::new(TracingReporter),
            stop_tx,
            stop_rx,
            started: false,
            read_task: None,
            write_task: None,
        }
    }

    /// Replace the error reporter (default: [`TracingReporter`]).
    pub fn with_reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Attach the connection and initialize the handler with its readable
    /// side. Must be called exactly once, before [`start`](Self::start).
    pub fn bind(&mut self, conn: C) -> Result<()> {
        if self.gate.is_some() {
            return Err(LinkError::AlreadyBound);
        }
        let handler = self.handler.as_mut().ok_or(LinkError::AlreadyStarted)?;

        let input = conn.try_clone()?;
        let closer = conn.try_clone()?;
        handler.init(Box::new(input)).map_err(LinkError::handler)?;

        self.transport = conn.transport_name();
        self.gate = Some(Arc::new(CloseGate::new(closer, self.config.name.clone())));
        self.conn = Some(conn);

        debug!(link = %self.config.name, transport = self.transport, "link bound");
        Ok(())
    }

    /// Static identifier of the bound transport ("tcp" before binding).
    pub fn protocol_name(&self) -> &'static str {
        self.transport
    }

    /// Launch the read and write loops and return without waiting for them.
    ///
    /// A [`stop`](Self::stop) issued before `start` is discarded.
    pub fn start(&mut self) -> Result<()> {
        self.start_with(spawn_named)
    }

    fn start_with(
        &mut self,
        mut spawn: impl FnMut(String, Task) -> std::io::Result<JoinHandle<()>>,
    ) -> Result<()> {
        if self.started {
            return Err(LinkError::AlreadyStarted);
        }
        let gate = self.gate.clone().ok_or(LinkError::NotBound)?;
        let conn = self.conn.take().ok_or(LinkError::NotBound)?;
        let handler = self.handler.take().ok_or(LinkError::AlreadyStarted)?;
        self.started = true;
        while self.stop_rx.try_recv().is_ok() {}
        gate.mark_open();

        let writer = WriteLoop {
            conn,
            requests: handler.outbound_requests(),
            stop: self.stop_rx.clone(),
            gate: Arc::clone(&gate),
            reporter: Arc::clone(&self.reporter),
            name: self.config.name.clone(),
        };
        match spawn(
            format!("{}-write", self.config.name),
            Box::new(move || writer.run()),
        ) {
            Ok(handle) => self.write_task = Some(handle),
            Err(source) => {
                gate.close();
                return Err(LinkError::Spawn {
                    role: "write",
                    source,
                });
            }
        }

        let reader = ReadLoop {
            handler,
            gate: Arc::clone(&gate),
            reporter: Arc::clone(&self.reporter),
            name: self.config.name.clone(),
            capacity: self.config.read_buffer_capacity,
        };
        match spawn(
            format!("{}-read", self.config.name),
            Box::new(move || reader.run()),
        ) {
            Ok(handle) => self.read_task = Some(handle),
            Err(source) => {
                self.stop();
                gate.close();
                return Err(LinkError::Spawn {
                    role: "read",
                    source,
                });
            }
        }

        debug!(link = %self.config.name, "link started");
        Ok(())
    }

    /// Close the underlying connection. Idempotent; no-op before binding.
    pub fn close(&self) {
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    /// Ask the write loop to exit without closing the connection.
    ///
    /// At most one stop request is pending at a time; extra calls are no-ops.
    /// Only affects a running write loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Handle that can close this link from another thread.
    pub fn close_handle(&self) -> Option<CloseHandle> {
        self.gate.as_ref().map(|gate| CloseHandle::new(Arc::clone(gate)))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.gate
            .as_ref()
            .map(|gate| gate.state())
            .unwrap_or(LinkState::Unbound)
    }

    /// Whether the connection has been closed (or is closing).
    pub fn is_closed(&self) -> bool {
        matches!(self.state(), LinkState::Closing | LinkState::Closed)
    }

    /// The handler, until [`start`](Self::start) moves it into the read loop.
    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    /// Link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Wait for both loops to exit.
    ///
    /// The write loop only exits after a failed write, a [`stop`](Self::stop),
    /// or once every outbound producer is gone, so owners that want a bounded
    /// wait call `stop` and `close` first.
    pub fn join(&mut self) {
        for (role, task) in [
            ("read", self.read_task.take()),
            ("write", self.write_task.take()),
        ] {
            if let Some(task) = task {
                if task.join().is_err() {
                    warn!(link = %self.config.name, role, "loop thread panicked");
                }
            }
        }
    }
}

impl<H, C> Drop for DuplexLink<H, C>
where
    C: Connection,
{
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }
}

fn spawn_named(name: String, task: Task) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name(name).spawn(task)
}

struct WriteLoop<C> {
    conn: C,
    requests: Receiver<WriteRequest>,
    stop: Receiver<()>,
    gate: Arc<CloseGate<C>>,
    reporter: Arc<dyn ErrorReporter>,
    name: String,
}

impl<C: Connection> WriteLoop<C> {
    fn run(mut self) {
        loop {
            let request = select! {
                recv(self.requests) -> request => match request {
                    Ok(request) => request,
                    Err(_) => {
                        debug!(link = %self.name, "outbound source closed; write loop exiting");
                        return;
                    }
                },
                recv(self.stop) -> _ => {
                    debug!(link = %self.name, "write loop stopped");
                    return;
                }
            };

            let (payload, ack) = request.into_parts();
            let outcome = write_payload(&mut self.conn, &payload);
            trace!(link = %self.name, size = payload.len(), ok = outcome.is_ok(), "payload written");

            if let Some(ack) = ack {
                ack.deliver(outcome.clone());
            }

            if let Err(err) = outcome {
                self.reporter
                    .report(&self.name, Direction::Write, &LinkError::Write(err));
                self.gate.close();
                return;
            }
        }
    }
}

/// Write `payload` with a single write call. Fewer bytes than requested is
/// a failure of its own, never retried.
fn write_payload<W: Write>(conn: &mut W, payload: &[u8]) -> std::result::Result<(), WriteError> {
    let written = loop {
        match conn.write(payload) {
            Ok(n) => break n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    };
    if written != payload.len() {
        return Err(WriteError::ShortWrite {
            written,
            expected: payload.len(),
        });
    }
    conn.flush()?;
    Ok(())
}

struct ReadLoop<H, C> {
    handler: H,
    gate: Arc<CloseGate<C>>,
    reporter: Arc<dyn ErrorReporter>,
    name: String,
    capacity: usize,
}

impl<H: ProtocolHandler, C: Connection> ReadLoop<H, C> {
    fn run(mut self) {
        let mut buf = BytesMut::with_capacity(self.capacity);
        loop {
            buf.clear();
            if let Err(err) = self.handler.handle(&mut buf) {
                self.reporter
                    .report(&self.name, Direction::Read, &LinkError::handler(err));
                self.gate.close();
                debug!(link = %self.name, "read loop exiting");
                return;
            }
        }
    }
}
