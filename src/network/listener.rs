//! Single-client TCP ingestion listener.
//!
//! Lifecycle: `Idle → Bound → Listening → Connected → Serving → Closed`. The listener
//! accepts exactly one client, frames its byte stream into JSON objects and hands them
//! to a [`StoreFacade`]. Every wait (accept, read, acknowledgment write) also watches a
//! [`ShutdownSignal`], and accept/read waits are bounded by the configured timeouts.

use super::framing::{FrameError, JsonFramer};
use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::record::StructuredRecord;
use crate::store::{IngressReport, StoreFacade};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, warn, Instrument};

/// Fixed acknowledgment written after each processed read.
pub const ACK_PAYLOAD: &[u8; 4] = b"test";

/// Pending connection queue length; only one client is ever served.
pub const LISTEN_BACKLOG: u32 = 1;

/// Name of the dedicated listener thread.
pub const LISTENER_THREAD_NAME: &str = "ingestion-listener";

/// Listener lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Nothing bound yet
    Idle,
    /// Socket bound to the listen address
    Bound,
    /// Accepting, backlog of one
    Listening,
    /// Client accepted
    Connected,
    /// Reading and ingesting records
    Serving,
    /// Finished; the socket is gone
    Closed,
}

/// Why a serving run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its side of the connection
    PeerClosed,
    /// The owner triggered shutdown
    Shutdown,
}

/// Totals for one listener run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeSummary {
    /// Client address, if one connected
    pub peer: Option<SocketAddr>,
    /// Socket reads that returned data
    pub reads: u64,
    /// Bytes received
    pub bytes_read: u64,
    /// Records stored
    pub records_ingested: u64,
    /// Frames or records rejected (each counted as a store drop)
    pub records_rejected: u64,
    /// Acknowledgments written
    pub acks_sent: u64,
    /// How the run ended
    pub close_reason: CloseReason,
}

impl ServeSummary {
    fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            peer,
            reads: 0,
            bytes_read: 0,
            records_ingested: 0,
            records_rejected: 0,
            acks_sent: 0,
            close_reason: CloseReason::Shutdown,
        }
    }

    fn add(&mut self, report: IngressReport) {
        self.records_ingested += report.accepted as u64;
        self.records_rejected += report.rejected as u64;
    }
}

/// Owner side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Create an untriggered handle.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask every listener holding a signal from this handle to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// A signal to hand to a listener.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is triggered. Never resolves if every handle is dropped
    /// without triggering.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// TCP endpoint delivering framed JSON records into a store.
pub struct IngestionListener {
    config: ListenerConfig,
    facade: Arc<dyn StoreFacade>,
    listener: TcpListener,
    local_addr: SocketAddr,
    state: watch::Sender<ListenerState>,
}

impl IngestionListener {
    /// Bind the configured address and start listening with a backlog of one.
    pub async fn bind(
        config: ListenerConfig,
        facade: Arc<dyn StoreFacade>,
    ) -> Result<Self, ListenerError> {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self::bind_attempts(config, facade, state, 0).await
    }

    /// [`bind`](Self::bind), retrying retryable failures `bind_retries` times.
    pub async fn bind_with_retry(
        config: ListenerConfig,
        facade: Arc<dyn StoreFacade>,
    ) -> Result<Self, ListenerError> {
        let (state, _) = watch::channel(ListenerState::Idle);
        let retries = config.bind_retries;
        Self::bind_attempts(config, facade, state, retries).await
    }

    /// [`bind_with_retry`](Self::bind_with_retry), publishing every transition from
    /// `Idle` onward into a caller-owned channel. A failed bind publishes `Closed`.
    pub async fn bind_observed(
        config: ListenerConfig,
        facade: Arc<dyn StoreFacade>,
        state: watch::Sender<ListenerState>,
    ) -> Result<Self, ListenerError> {
        state.send_replace(ListenerState::Idle);
        let retries = config.bind_retries;
        Self::bind_attempts(config, facade, state, retries).await
    }

    async fn bind_attempts(
        config: ListenerConfig,
        facade: Arc<dyn StoreFacade>,
        state: watch::Sender<ListenerState>,
        retries: u32,
    ) -> Result<Self, ListenerError> {
        let delay = Duration::from_millis(config.bind_retry_delay_ms);
        let mut attempt = 0;
        loop {
            match open_socket(&config, &state) {
                Ok((listener, local_addr)) => {
                    info!(%local_addr, "ingestion listener ready");
                    return Ok(Self {
                        config,
                        facade,
                        listener,
                        local_addr,
                        state,
                    });
                }
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    state.send_replace(ListenerState::Idle);
                    warn!(error = %e, attempt, "bind failed, retrying in {:?}", delay);
                    sleep(delay).await;
                }
                Err(e) => {
                    state.send_replace(ListenerState::Closed);
                    return Err(e);
                }
            }
        }
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Observe state transitions from `Listening` onward, including those after `run`
    /// consumes the listener. Use [`bind_observed`](Self::bind_observed) to see earlier ones.
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Accept one client and ingest its records until EOF, shutdown, or a connection error.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<ServeSummary, ListenerError> {
        let Self {
            config,
            facade,
            listener,
            local_addr,
            state,
        } = self;

        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            accepted = accept_client(&listener, config.accept_timeout()) => Some(accepted),
        };
        // Single client: stop listening as soon as the accept wait is over.
        drop(listener);

        let (socket, peer) = match accepted {
            None => {
                info!(%local_addr, "shutdown before any client connected");
                state.send_replace(ListenerState::Closed);
                return Ok(ServeSummary::new(None));
            }
            Some(Err(e)) => {
                state.send_replace(ListenerState::Closed);
                return Err(e);
            }
            Some(Ok(accepted)) => accepted,
        };

        info!(%peer, "client connected");
        state.send_replace(ListenerState::Connected);
        if let Err(e) = socket.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle");
        }

        state.send_replace(ListenerState::Serving);
        let session = Session {
            config: &config,
            facade: facade.as_ref(),
            peer,
        };
        let result = session
            .serve(socket, &mut shutdown)
            .instrument(info_span!("ingestion", %peer))
            .await;

        state.send_replace(ListenerState::Closed);
        match &result {
            Ok(summary) => info!(
                %peer,
                reason = ?summary.close_reason,
                records = summary.records_ingested,
                rejected = summary.records_rejected,
                "client session closed"
            ),
            Err(e) => warn!(%peer, error = %e, "client session failed"),
        }
        result
    }

    /// Bind, serve and close on a dedicated thread, blocking the caller until it ends.
    pub fn start(
        config: ListenerConfig,
        facade: Arc<dyn StoreFacade>,
        shutdown: ShutdownSignal,
    ) -> Result<ServeSummary, ListenerError> {
        let thread = ListenerThread::spawn(config, facade, shutdown)?;
        debug!(local_addr = %thread.local_addr(), "waiting for listener thread");
        thread.join()
    }
}

/// One accepted client.
struct Session<'a> {
    config: &'a ListenerConfig,
    facade: &'a dyn StoreFacade,
    peer: SocketAddr,
}

impl Session<'_> {
    async fn serve(
        &self,
        mut socket: TcpStream,
        shutdown: &mut ShutdownSignal,
    ) -> Result<ServeSummary, ListenerError> {
        let peer = self.peer;
        let mut summary = ServeSummary::new(Some(peer));
        let mut buf = vec![0u8; self.config.read_buffer_size];
        let mut framer = JsonFramer::new(self.config.max_message_size);
        let read_timeout = self.config.read_timeout();

        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    summary.close_reason = CloseReason::Shutdown;
                    break;
                }
                read = read_chunk(&mut socket, &mut buf, read_timeout) => read,
            };

            match read {
                Ok(Some(0)) => {
                    info!(%peer, "client disconnected");
                    if framer.pending() > 0 {
                        warn!(bytes = framer.pending(), "discarding incomplete trailing message");
                        self.facade.record_dropped();
                        summary.records_rejected += 1;
                    }
                    summary.close_reason = CloseReason::PeerClosed;
                    break;
                }
                Ok(Some(n)) => {
                    summary.reads += 1;
                    summary.bytes_read += n as u64;
                    framer.extend(&buf[..n]);
                    summary.add(self.ingest_frames(&mut framer));

                    if self.config.acknowledge {
                        let written = tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => {
                                summary.close_reason = CloseReason::Shutdown;
                                break;
                            }
                            written = socket.write_all(ACK_PAYLOAD) => written,
                        };
                        written.map_err(|source| ListenerError::Write { peer, source })?;
                        summary.acks_sent += 1;
                        debug!(bytes = ACK_PAYLOAD.len(), "acknowledgment written");
                    }
                }
                Ok(None) => {
                    warn!(%peer, "read timeout, still waiting for data");
                }
                Err(source) => return Err(ListenerError::Read { peer, source }),
            }
        }

        if let Err(e) = socket.shutdown().await {
            debug!(error = %e, "socket shutdown failed");
        }
        Ok(summary)
    }

    /// Turn every complete frame into a record and ingress them in arrival order.
    fn ingest_frames(&self, framer: &mut JsonFramer) -> IngressReport {
        let mut records = Vec::new();
        let mut report = IngressReport::default();

        while let Some(frame) = framer.next_frame() {
            let record = frame
                .map_err(|e: FrameError| e.to_string())
                .and_then(|value| StructuredRecord::from_value(value).map_err(|e| e.to_string()));
            match record {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(%reason, "dropping unusable frame");
                    self.facade.record_dropped();
                    report.rejected += 1;
                }
            }
        }

        if !records.is_empty() {
            report.merge(self.facade.ingress_records(&records));
        }
        report
    }
}

/// A listener running on its own thread with a private runtime.
#[derive(Debug)]
pub struct ListenerThread {
    local_addr: SocketAddr,
    handle: JoinHandle<Result<ServeSummary, ListenerError>>,
}

impl ListenerThread {
    /// Spawn the listener thread and wait until it is listening (or failed to bind).
    pub fn spawn(
        config: ListenerConfig,
        facade: Arc<dyn StoreFacade>,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ListenerError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let handle = std::thread::Builder::new()
            .name(LISTENER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(ListenerError::Runtime)?;

                runtime.block_on(async move {
                    let listener = IngestionListener::bind_with_retry(config, facade).await?;
                    let _ = ready_tx.send(listener.local_addr());
                    listener.run(shutdown).await
                })
            })
            .map_err(ListenerError::Runtime)?;

        match ready_rx.recv() {
            Ok(local_addr) => Ok(Self { local_addr, handle }),
            // The thread ended before listening; its result carries the reason.
            Err(_) => match join_listener(handle) {
                Err(e) => Err(e),
                Ok(_) => Err(ListenerError::ThreadPanicked),
            },
        }
    }

    /// Address the thread is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until the listener finishes.
    pub fn join(self) -> Result<ServeSummary, ListenerError> {
        join_listener(self.handle)
    }
}

fn join_listener(
    handle: JoinHandle<Result<ServeSummary, ListenerError>>,
) -> Result<ServeSummary, ListenerError> {
    handle.join().map_err(|_| ListenerError::ThreadPanicked)?
}

/// Bind and listen on the configured address, publishing `Bound` then `Listening`.
fn open_socket(
    config: &ListenerConfig,
    state: &watch::Sender<ListenerState>,
) -> Result<(TcpListener, SocketAddr), ListenerError> {
    let addr = config
        .socket_addr()
        .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|source| ListenerError::Bind { addr, source })?;
    socket
        .set_reuseaddr(true)
        .map_err(|source| ListenerError::Bind { addr, source })?;
    socket
        .bind(addr)
        .map_err(|source| ListenerError::Bind { addr, source })?;
    state.send_replace(ListenerState::Bound);

    let listener = socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| ListenerError::Listen { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Listen { addr, source })?;
    state.send_replace(ListenerState::Listening);
    Ok((listener, local_addr))
}

async fn accept_client(
    listener: &TcpListener,
    limit: Option<Duration>,
) -> Result<(TcpStream, SocketAddr), ListenerError> {
    match limit {
        Some(limit) => timeout(limit, listener.accept())
            .await
            .map_err(|_| ListenerError::AcceptTimeout(limit.as_millis() as u64))?
            .map_err(ListenerError::Accept),
        None => listener.accept().await.map_err(ListenerError::Accept),
    }
}

/// `Ok(None)` means the read wait timed out.
async fn read_chunk(
    socket: &mut TcpStream,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> std::io::Result<Option<usize>> {
    match limit {
        Some(limit) => match timeout(limit, socket.read(buf)).await {
            Ok(read) => read.map(Some),
            Err(_) => Ok(None),
        },
        None => socket.read(buf).await.map(Some),
    }
}
