//! Multiplexed session over a single transport

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::MuxConfig;
use super::stream::{MuxStream, StreamSlot};
use crate::codec::{Frame, FrameCodec};
use crate::error::MuxError;
use crate::message::Message;
use crate::stream_id::StreamId;

/// How long the writer keeps flushing queued frames after the session closes
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Replies the reader may queue (pongs, resets) before it stops reading
const CONTROL_QUEUE: usize = 64;

/// Which end of the transport a session sits on.
///
/// The initiator (the side that dialed) allocates odd stream ids and the
/// acceptor even ones, so both can open streams concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The dialing side
    Initiator,
    /// The listening side
    Acceptor,
}

impl Role {
    fn first_stream_id(self) -> u32 {
        match self {
            Role::Initiator => 1,
            Role::Acceptor => 2,
        }
    }

    /// Whether `id` is in the range this side allocates from
    fn owns(self, id: StreamId) -> bool {
        id.is_initiator() == (self == Role::Initiator)
    }
}

/// State shared by the session handle, its streams and its background tasks
#[derive(Debug)]
pub(crate) struct Shared {
    role: Role,
    config: MuxConfig,
    frame_tx: mpsc::UnboundedSender<Frame>,
    streams: DashMap<StreamId, Arc<StreamSlot>>,
    pings: DashMap<u64, oneshot::Sender<()>>,
    next_stream_id: AtomicU32,
    next_nonce: AtomicU64,
    closed: CancellationToken,
    /// Set by a local close; the writer ends the transport with `GoAway`
    going_away: AtomicBool,
}

/// What the reader does after applying a frame
enum Handled {
    Continue,
    /// Send this frame back to the peer before reading on
    Reply(Frame),
    GoAway,
}

impl Shared {
    /// Queue a frame for the writer task
    pub(crate) fn send_frame(&self, frame: Frame) -> Result<(), MuxError> {
        if self.closed.is_cancelled() {
            return Err(MuxError::SessionClosed);
        }
        self.frame_tx
            .send(frame)
            .map_err(|_| MuxError::SessionClosed)
    }

    pub(crate) fn remove_stream(&self, id: StreamId) {
        self.streams.remove(&id);
    }

    /// Mark the session closed and reset every stream on it
    fn shutdown(&self) {
        if !self.closed.is_cancelled() {
            debug!("Session closing ({:?}, {} streams)", self.role, self.streams.len());
        }
        self.closed.cancel();

        let slots: Vec<Arc<StreamSlot>> = self.streams.iter().map(|r| Arc::clone(r.value())).collect();
        self.streams.clear();
        for slot in slots {
            slot.reset();
        }
        // Dropping the senders fails any ping still waiting
        self.pings.clear();
    }

    /// Shut down and have the writer announce it to the peer
    fn close(&self) {
        self.going_away.store(true, Ordering::Relaxed);
        self.shutdown();
    }

    async fn ping(&self) -> Result<Duration, MuxError> {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pings.insert(nonce, tx);

        if let Err(e) = self.send_frame(Frame::control(Message::Ping { nonce })) {
            self.pings.remove(&nonce);
            return Err(e);
        }

        let started = Instant::now();
        match tokio::time::timeout(self.config.ping_timeout, rx).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(_)) => Err(MuxError::SessionClosed),
            Err(_) => {
                self.pings.remove(&nonce);
                Err(MuxError::PingTimeout(self.config.ping_timeout))
            }
        }
    }

    /// Apply one inbound frame
    fn handle_frame(self: &Arc<Self>, frame: Frame, inbound: &mpsc::Sender<MuxStream>) -> Handled {
        let id = frame.stream_id;
        let session_level = frame.message.message_type().is_session_level();
        if session_level != (id == StreamId::CONTROL) {
            warn!(
                "Ignoring {:?} on {}",
                frame.message.message_type(),
                id
            );
            return Handled::Continue;
        }

        match frame.message {
            Message::Open => return self.accept_open(id, inbound),
            Message::Data(data) => {
                let Some(slot) = self.slot(id) else {
                    trace!("Data for unknown {}", id);
                    return Handled::Continue;
                };
                if !slot.push_data(data) {
                    warn!("Peer overran the receive window on {}", id);
                    slot.reset();
                    self.remove_stream(id);
                    return Handled::Reply(Frame::new(id, Message::Reset));
                }
            }
            Message::WindowUpdate { credit } => {
                if let Some(slot) = self.slot(id) {
                    slot.add_credit(credit);
                }
            }
            Message::Close => {
                if let Some(slot) = self.slot(id) {
                    slot.remote_close();
                }
            }
            Message::Reset => {
                if let Some((_, slot)) = self.streams.remove(&id) {
                    slot.reset();
                }
            }
            Message::Ping { nonce } => {
                return Handled::Reply(Frame::control(Message::Pong { nonce }));
            }
            Message::Pong { nonce } => {
                if let Some((_, waiter)) = self.pings.remove(&nonce) {
                    let _ = waiter.send(());
                }
            }
            Message::GoAway => return Handled::GoAway,
        }
        Handled::Continue
    }

    fn slot(&self, id: StreamId) -> Option<Arc<StreamSlot>> {
        self.streams.get(&id).map(|r| Arc::clone(r.value()))
    }

    fn accept_open(self: &Arc<Self>, id: StreamId, inbound: &mpsc::Sender<MuxStream>) -> Handled {
        let refuse = Handled::Reply(Frame::new(id, Message::Reset));
        if self.role.owns(id) || self.streams.contains_key(&id) {
            warn!("Rejecting open of {}", id);
            return refuse;
        }
        if self.config.accept_backlog == 0 {
            debug!("Refusing {}: session does not accept streams", id);
            return refuse;
        }
        let Ok(permit) = inbound.try_reserve() else {
            debug!("Refusing {}: accept backlog full", id);
            return refuse;
        };

        let slot = Arc::new(StreamSlot::new(id));
        self.streams.insert(id, Arc::clone(&slot));
        if self.closed.is_cancelled() {
            slot.reset();
            self.remove_stream(id);
            return Handled::Continue;
        }

        permit.send(MuxStream::new(slot, Arc::clone(self)));
        trace!("Peer opened {}", id);
        Handled::Continue
    }
}

/// A multiplexed session.
///
/// Cloning is cheap; all clones drive the same underlying transport. The
/// session is closed when either side calls [`close`](Session::close), when
/// the transport fails or reaches EOF, or when a keepalive ping goes
/// unanswered. Closing resets every open stream.
#[derive(Debug, Clone)]
pub struct Session {
    shared: Arc<Shared>,
    inbound: Arc<Mutex<mpsc::Receiver<MuxStream>>>,
}

impl Session {
    /// Start a session as the dialing side
    pub fn client<T>(io: T, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::new(io, Role::Initiator, config)
    }

    /// Start a session as the listening side
    pub fn server<T>(io: T, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::new(io, Role::Acceptor, config)
    }

    /// Wrap `io` and spawn the reader, writer and keepalive tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<T>(io: T, role: Role, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::channel(CONTROL_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.accept_backlog.max(1));
        let keepalive = config.keepalive_interval;

        let shared = Arc::new(Shared {
            role,
            config,
            frame_tx,
            streams: DashMap::new(),
            pings: DashMap::new(),
            next_stream_id: AtomicU32::new(role.first_stream_id()),
            next_nonce: AtomicU64::new(1),
            closed: CancellationToken::new(),
            going_away: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(
            Arc::clone(&shared),
            reply_rx,
            frame_rx,
            FramedWrite::new(writer, FrameCodec::new()),
        ));
        tokio::spawn(read_loop(
            Arc::clone(&shared),
            FramedRead::new(reader, FrameCodec::new()),
            inbound_tx,
            reply_tx,
        ));
        if let Some(interval) = keepalive {
            tokio::spawn(keepalive_loop(Arc::clone(&shared), interval));
        }

        Self {
            shared,
            inbound: Arc::new(Mutex::new(inbound_rx)),
        }
    }

    /// Open a new outbound stream.
    ///
    /// The peer learns of the stream immediately; data may be written
    /// without waiting for it to be accepted.
    pub fn open_stream(&self) -> Result<MuxStream, MuxError> {
        if self.shared.closed.is_cancelled() {
            return Err(MuxError::SessionClosed);
        }

        let raw = self
            .shared
            .next_stream_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(2))
            .map_err(|_| MuxError::StreamsExhausted)?;
        let id = StreamId::new(raw);

        let slot = Arc::new(StreamSlot::new(id));
        self.shared.streams.insert(id, Arc::clone(&slot));
        let stream = MuxStream::new(slot, Arc::clone(&self.shared));

        self.shared.send_frame(Frame::new(id, Message::Open))?;
        // A close racing with the insert above may have missed this stream
        if self.shared.closed.is_cancelled() {
            return Err(MuxError::SessionClosed);
        }

        trace!("Opened {}", id);
        Ok(stream)
    }

    /// Wait for the peer to open a stream.
    ///
    /// Fails with [`MuxError::SessionClosed`] once the session is closed.
    pub async fn accept_stream(&self) -> Result<MuxStream, MuxError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => Err(MuxError::SessionClosed),
            stream = inbound.recv() => stream.ok_or(MuxError::SessionClosed),
        }
    }

    /// Round-trip a ping through the peer and return the elapsed time
    pub async fn ping(&self) -> Result<Duration, MuxError> {
        self.shared.ping().await
    }

    /// Close the session and reset all of its streams
    pub fn close(&self) {
        self.shared.close();
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Number of streams currently open
    pub fn num_streams(&self) -> usize {
        self.shared.streams.len()
    }

    /// Which end of the transport this session is
    pub fn role(&self) -> Role {
        self.shared.role
    }
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    mut replies: mpsc::Receiver<Frame>,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    mut sink: FramedWrite<W, FrameCodec>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            biased;
            Some(frame) = replies.recv() => frame,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = shared.closed.cancelled() => break,
        };

        // A batch already taken off the queues is finished before closing
        let result = tokio::select! {
            biased;
            r = feed_batch(&mut sink, &mut replies, &mut rx, first) => r,
            _ = shared.closed.cancelled() => break,
        };
        if let Err(e) = result {
            debug!("Session write failed: {}", e);
            break;
        }
    }

    // Flush whatever was queued before the close, then GoAway
    let going_away = shared.going_away.load(Ordering::Relaxed);
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Ok(frame) = replies.try_recv().or_else(|_| rx.try_recv()) {
            if sink.feed(frame).await.is_err() {
                return;
            }
        }
        if going_away && sink.feed(Frame::control(Message::GoAway)).await.is_err() {
            return;
        }
        let _ = sink.close().await;
    })
    .await;

    shared.shutdown();
}

/// Write `first` plus everything already queued behind it, then flush once
async fn feed_batch<W>(
    sink: &mut FramedWrite<W, FrameCodec>,
    replies: &mut mpsc::Receiver<Frame>,
    rx: &mut mpsc::UnboundedReceiver<Frame>,
    first: Frame,
) -> Result<(), crate::ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    sink.feed(first).await?;
    while let Ok(frame) = replies.try_recv().or_else(|_| rx.try_recv()) {
        sink.feed(frame).await?;
    }
    sink.flush().await
}

async fn read_loop<R>(
    shared: Arc<Shared>,
    mut frames: FramedRead<R, FrameCodec>,
    inbound: mpsc::Sender<MuxStream>,
    replies: mpsc::Sender<Frame>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = shared.closed.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(frame)) => match shared.handle_frame(frame, &inbound) {
                Handled::Continue => {}
                Handled::Reply(reply) => {
                    // Reading stalls while the writer is behind on replies
                    let sent = tokio::select! {
                        _ = shared.closed.cancelled() => break,
                        sent = replies.send(reply) => sent,
                    };
                    if sent.is_err() {
                        break;
                    }
                }
                Handled::GoAway => {
                    debug!("Peer closed the session");
                    break;
                }
            },
            Some(Err(e)) => {
                warn!("Session read failed: {}", e);
                break;
            }
            None => {
                debug!("Transport reached EOF");
                break;
            }
        }
    }

    shared.shutdown();
}

async fn keepalive_loop(shared: Arc<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.closed.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match shared.ping().await {
            Ok(rtt) => trace!("Keepalive rtt {:?}", rtt),
            Err(MuxError::SessionClosed) => break,
            Err(e) => {
                warn!("Keepalive failed: {}", e);
                shared.close();
                break;
            }
        }
    }
}
