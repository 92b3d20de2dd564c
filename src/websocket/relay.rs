//! Bidirectional frame relay for one proxied session.
//!
//! # Responsibilities
//! - Register the session pair and run both forwarding directions concurrently
//! - Translate and forward the first close observed to the opposite leg
//! - Tear both legs down together and release the registry entry exactly once
//!
//! # Session States
//! ```text
//! Connecting ──dial ok──▶ Active ──first close / error──▶ Closing ──both pumps done──▶ Closed
//!      │                                                                              ▲
//!      └──────────────────────────────dial failed (reject)────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - One spawned task per direction; the caller's task is the coordination point
//! - Frames are moved, never cloned, from the receiving half to the sending half
//! - `Sink::send` waits for readiness, so a slow peer suspends the pump (no drops)
//! - The right to close the opposite leg is a single atomic claim
//! - A leg that sent or was sent a close takes no more data frames; they are dropped
//! - A close request preempts a send stuck on a full destination
//! - Once closing starts, stragglers get a bounded drain window before being aborted

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::poll_fn;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tracing::Instrument;

use crate::observability::metrics;
use crate::websocket::close::CloseEvent;
use crate::websocket::error::ProxyError;
use crate::websocket::frame::{Frame, FrameTransport};
use crate::websocket::registry::{CloseRequest, ConnectionHandle, SessionRegistry, Side};

/// Lifecycle of a proxied session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Client accepted, upstream dial in progress.
    Connecting,
    /// Both directions forwarding.
    Active,
    /// One side signalled closure; draining.
    Closing,
    /// Terminal. Registry entry removed.
    Closed,
}

/// Forwarding direction of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client_to_upstream",
            Direction::UpstreamToClient => "upstream_to_client",
        }
    }

    /// The leg this direction reads from.
    pub fn source(&self) -> Side {
        match self {
            Direction::ClientToUpstream => Side::Client,
            Direction::UpstreamToClient => Side::Upstream,
        }
    }

    /// The leg this direction writes to.
    pub fn destination(&self) -> Side {
        match self {
            Direction::ClientToUpstream => Side::Upstream,
            Direction::UpstreamToClient => Side::Client,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pump stopped.
#[derive(Debug)]
pub enum PumpExit {
    /// The source sent a close frame.
    Closed(CloseEvent),
    /// The source ended without a close frame.
    Ended,
    /// Reading from the source failed.
    SourceError(ProxyError),
    /// Writing to the destination failed.
    DestinationError(ProxyError),
    /// Cancelled after the drain window elapsed.
    Aborted,
    /// The pump task panicked.
    Failed(String),
}

/// Outcome of one forwarding direction.
#[derive(Debug)]
pub struct PumpReport {
    pub frames: u64,
    pub exit: PumpExit,
}

/// Outcome of a finished relay.
#[derive(Debug)]
pub struct RelayReport {
    pub client_to_upstream: PumpReport,
    pub upstream_to_client: PumpReport,
    /// True when a pump had to be aborted after the drain window.
    pub drain_timed_out: bool,
    /// True when this relay removed its own registry entry.
    pub released: bool,
}

/// State shared by the two pumps of a session.
#[derive(Debug)]
struct RelayShared {
    session_id: String,
    close_claimed: AtomicBool,
    /// Set once a close frame went to, or arrived from, the client leg.
    client_closed: AtomicBool,
    upstream_closed: AtomicBool,
    state: watch::Sender<SessionState>,
    client_to_upstream: AtomicU64,
    upstream_to_client: AtomicU64,
}

impl RelayShared {
    /// Claim the right to close the opposite leg. Only the first caller wins.
    fn claim_close(&self) -> bool {
        self.close_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn leg_closed(&self, side: Side) -> &AtomicBool {
        match side {
            Side::Client => &self.client_closed,
            Side::Upstream => &self.upstream_closed,
        }
    }

    fn is_closed(&self, side: Side) -> bool {
        self.leg_closed(side).load(Ordering::Acquire)
    }

    /// Mark a leg closed. Returns false if it already was.
    fn mark_closed(&self, side: Side) -> bool {
        !self.leg_closed(side).swap(true, Ordering::AcqRel)
    }

    fn begin_closing(&self) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = SessionState::Closing;
                true
            } else {
                false
            }
        });
    }

    fn counter(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::ClientToUpstream => &self.client_to_upstream,
            Direction::UpstreamToClient => &self.upstream_to_client,
        }
    }
}

/// Relays frames between an accepted client leg and a dialed upstream leg.
pub struct ProxyRelay {
    shared: Arc<RelayShared>,
    registry: Arc<SessionRegistry>,
    close_timeout: Duration,
}

impl ProxyRelay {
    /// Create a relay in the `Connecting` state.
    pub fn new(
        session_id: impl Into<String>,
        registry: Arc<SessionRegistry>,
        close_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            shared: Arc::new(RelayShared {
                session_id: session_id.into(),
                close_claimed: AtomicBool::new(false),
                client_closed: AtomicBool::new(false),
                upstream_closed: AtomicBool::new(false),
                state,
                client_to_upstream: AtomicU64::new(0),
                upstream_to_client: AtomicU64::new(0),
            }),
            registry,
            close_timeout,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Watch the session state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Close the client leg after a failed upstream dial. Nothing is registered.
    pub async fn reject<C: FrameTransport>(self, mut client: C, reason: &str) {
        let event = CloseEvent::protocol_error(reason);
        tracing::debug!(session_id = %self.shared.session_id, code = event.code, "Rejecting client");

        if let Err(e) = client.send(Frame::Close(Some(event))).await {
            tracing::debug!(session_id = %self.shared.session_id, error = %e, "Client gone before close");
        } else {
            // Let the client's close reply arrive so the handshake completes.
            let _ = tokio::time::timeout(self.close_timeout, drain(&mut client)).await;
        }

        self.shared.state.send_replace(SessionState::Closed);
    }

    /// Register the pair and relay until both directions finish.
    pub async fn run<C, U>(self, client: C, upstream: U) -> RelayReport
    where
        C: FrameTransport,
        U: FrameTransport,
    {
        let session_id = self.shared.session_id.clone();
        // Acks resolve within the drain window at the latest, when stuck pumps are aborted.
        let ack_timeout = self.close_timeout * 2;
        let (client_handle, client_requests) = ConnectionHandle::new(&session_id, Side::Client);
        let (upstream_handle, upstream_requests) = ConnectionHandle::new(&session_id, Side::Upstream);
        let client_handle = client_handle.with_ack_timeout(ack_timeout);
        let upstream_handle = upstream_handle.with_ack_timeout(ack_timeout);

        let generation = self.registry.add(&session_id, client_handle, upstream_handle);
        self.shared.state.send_replace(SessionState::Active);
        metrics::ws_session_opened();
        let started = Instant::now();
        tracing::info!(session_id = %session_id, "Session active");

        let (client_sink, client_stream) = client.split();
        let (upstream_sink, upstream_stream) = upstream.split();

        let mut inbound = tokio::spawn(
            pump(
                Direction::ClientToUpstream,
                client_stream,
                upstream_sink,
                upstream_requests,
                self.shared.clone(),
            )
            .in_current_span(),
        );
        let mut outbound = tokio::spawn(
            pump(
                Direction::UpstreamToClient,
                upstream_stream,
                client_sink,
                client_requests,
                self.shared.clone(),
            )
            .in_current_span(),
        );

        let mut inbound_result = None;
        let mut outbound_result = None;
        let mut state = self.shared.state.subscribe();
        let close_timeout = self.close_timeout;

        let drain_timed_out = tokio::select! {
            _ = async {
                inbound_result = Some((&mut inbound).await);
                outbound_result = Some((&mut outbound).await);
            } => false,
            _ = async {
                let _ = state.wait_for(|s| *s != SessionState::Active).await;
                tokio::time::sleep(close_timeout).await;
            } => true,
        };

        if drain_timed_out {
            tracing::warn!(
                session_id = %session_id,
                timeout = ?close_timeout,
                "Drain window elapsed, aborting remaining forwarding"
            );
            inbound.abort();
            outbound.abort();
        }
        let inbound_result = match inbound_result {
            Some(result) => result,
            None => inbound.await,
        };
        let outbound_result = match outbound_result {
            Some(result) => result,
            None => outbound.await,
        };

        let report = RelayReport {
            client_to_upstream: PumpReport {
                frames: self.shared.client_to_upstream.load(Ordering::Relaxed),
                exit: exit_from(inbound_result),
            },
            upstream_to_client: PumpReport {
                frames: self.shared.upstream_to_client.load(Ordering::Relaxed),
                exit: exit_from(outbound_result),
            },
            drain_timed_out,
            released: self.registry.release(&session_id, generation),
        };
        self.shared.state.send_replace(SessionState::Closed);
        metrics::ws_session_closed(started.elapsed());

        tracing::info!(
            session_id = %session_id,
            client_to_upstream = report.client_to_upstream.frames,
            upstream_to_client = report.upstream_to_client.frames,
            duration = ?started.elapsed(),
            "Session closed"
        );
        report
    }
}

fn exit_from(result: Result<PumpExit, JoinError>) -> PumpExit {
    match result {
        Ok(exit) => exit,
        Err(e) if e.is_cancelled() => PumpExit::Aborted,
        Err(e) => PumpExit::Failed(e.to_string()),
    }
}

/// Forward frames from `source` to `dest` until the source closes or fails.
async fn pump<S, D>(
    direction: Direction,
    mut source: S,
    mut dest: D,
    mut requests: mpsc::Receiver<CloseRequest>,
    shared: Arc<RelayShared>,
) -> PumpExit
where
    S: Stream<Item = Result<Frame, ProxyError>> + Unpin,
    D: Sink<Frame, Error = ProxyError> + Unpin,
{
    let mut requests_open = true;

    loop {
        tokio::select! {
            request = requests.recv(), if requests_open => match request {
                Some(request) => close_on_request(direction, &mut dest, request, &shared).await,
                None => requests_open = false,
            },
            next = source.next() => match next {
                Some(Ok(Frame::Close(frame))) => {
                    shared.mark_closed(direction.source());
                    let event = frame.unwrap_or_else(CloseEvent::no_status);
                    tracing::debug!(session_id = %shared.session_id, direction = %direction, code = event.code, "Close received");
                    forward_close(direction, &mut dest, &event, &shared).await;
                    drain(&mut source).await;
                    return PumpExit::Closed(event);
                }
                Some(Ok(frame)) => {
                    if shared.is_closed(direction.destination()) {
                        tracing::trace!(session_id = %shared.session_id, kind = frame.kind(), "Dropping frame after close");
                        continue;
                    }
                    match deliver(&mut dest, frame, &mut requests, &mut requests_open).await {
                        Ok(Delivery::Sent) => forwarded(direction, &shared),
                        Ok(Delivery::Preempted { request, queued }) => {
                            if queued {
                                forwarded(direction, &shared);
                            }
                            close_on_request(direction, &mut dest, request, &shared).await;
                        }
                        // The peer closed this leg while the frame was in flight.
                        Err(e) if shared.is_closed(direction.destination()) => {
                            tracing::debug!(session_id = %shared.session_id, direction = %direction, error = %e, "Dropping frame for closed leg");
                        }
                        Err(e) => {
                            tracing::warn!(session_id = %shared.session_id, direction = %direction, error = %e, "Forwarding failed");
                            shared.begin_closing();
                            return PumpExit::DestinationError(e);
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(session_id = %shared.session_id, direction = %direction, error = %e, "Transport error, closing session");
                    forward_close(direction, &mut dest, &CloseEvent::abnormal(), &shared).await;
                    return PumpExit::SourceError(e);
                }
                None => {
                    tracing::debug!(session_id = %shared.session_id, direction = %direction, "Source ended without close");
                    forward_close(direction, &mut dest, &CloseEvent::abnormal(), &shared).await;
                    return PumpExit::Ended;
                }
            }
        }
    }
}

fn forwarded(direction: Direction, shared: &RelayShared) {
    shared.counter(direction).fetch_add(1, Ordering::Relaxed);
    metrics::ws_frame_forwarded(direction.as_str());
}

/// Result of handing one data frame to a destination.
enum Delivery {
    Sent,
    /// A close request arrived first. `queued` is true if the frame had already
    /// been accepted by the sink.
    Preempted { request: CloseRequest, queued: bool },
}

/// Send `frame` to `dest`, giving up as soon as a close request arrives.
///
/// Readiness and flush are awaited separately so the frame is only moved into the
/// sink once it has room.
async fn deliver<D>(
    dest: &mut D,
    frame: Frame,
    requests: &mut mpsc::Receiver<CloseRequest>,
    requests_open: &mut bool,
) -> Result<Delivery, ProxyError>
where
    D: Sink<Frame, Error = ProxyError> + Unpin,
{
    let preempted = until_request(poll_fn(|cx| dest.poll_ready_unpin(cx)), requests, requests_open).await?;
    if let Some(request) = preempted {
        return Ok(Delivery::Preempted { request, queued: false });
    }

    dest.start_send_unpin(frame)?;

    let preempted = until_request(poll_fn(|cx| dest.poll_flush_unpin(cx)), requests, requests_open).await?;
    Ok(match preempted {
        Some(request) => Delivery::Preempted { request, queued: true },
        None => Delivery::Sent,
    })
}

/// Drive `io` to completion unless a close request arrives first.
async fn until_request<F>(
    mut io: F,
    requests: &mut mpsc::Receiver<CloseRequest>,
    requests_open: &mut bool,
) -> Result<Option<CloseRequest>, ProxyError>
where
    F: Future<Output = Result<(), ProxyError>> + Unpin,
{
    loop {
        tokio::select! {
            result = &mut io => return result.map(|()| None),
            request = requests.recv(), if *requests_open => match request {
                Some(request) => return Ok(Some(request)),
                None => *requests_open = false,
            },
        }
    }
}

/// Close the destination leg on behalf of its `ConnectionHandle`.
async fn close_on_request<D>(direction: Direction, dest: &mut D, request: CloseRequest, shared: &RelayShared)
where
    D: Sink<Frame, Error = ProxyError> + Unpin,
{
    let CloseRequest { event, done } = request;
    // Starts the drain window, which bounds the send below.
    shared.begin_closing();

    if shared.mark_closed(direction.destination()) {
        tracing::debug!(
            session_id = %shared.session_id,
            side = %direction.destination(),
            code = event.code,
            "Closing leg on request"
        );
        if let Err(e) = dest.send(Frame::Close(Some(event))).await {
            tracing::debug!(session_id = %shared.session_id, error = %e, "Close not delivered");
        }
    }
    let _ = done.send(());
}

/// Send the translated close to `dest` if this pump wins the close claim.
async fn forward_close<D>(direction: Direction, dest: &mut D, event: &CloseEvent, shared: &RelayShared)
where
    D: Sink<Frame, Error = ProxyError> + Unpin,
{
    shared.begin_closing();
    // A leg that already saw a close in either direction gets no second one.
    if shared.is_closed(direction.destination()) || !shared.claim_close() {
        return;
    }
    shared.mark_closed(direction.destination());

    let forwarded = event.translated();
    tracing::debug!(
        session_id = %shared.session_id,
        direction = %direction,
        received = event.code,
        forwarded = forwarded.code,
        "Forwarding close"
    );
    metrics::ws_close_forwarded(direction.as_str(), forwarded.code);
    if let Err(e) = dest.send(Frame::Close(Some(forwarded))).await {
        tracing::debug!(session_id = %shared.session_id, error = %e, "Close not delivered");
    }
}

/// Read until the stream ends, so pending close replies get flushed.
async fn drain<S, T>(source: &mut S)
where
    S: Stream<Item = T> + Unpin,
{
    while source.next().await.is_some() {}
}
