//! Framed connections with queued reads and writes.
//!
//! An [`Endpoint`] owns one connection. A read task decodes frames into a bounded
//! inbound queue and a write task drains a bounded outbound queue into the
//! socket. Either task ending, or [`Endpoint::close`], stops both; the owner then
//! observes the inbound queue as closed.

pub mod connector;

pub use connector::{BackendConnector, TcpBackendConnector};

use crate::protocol::{Frame, FrameCodec, FrameDecoder, FrameEncoder};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Queue capacity of a game client connection.
pub const CLIENT_QUEUE_CAPACITY: usize = 10;
/// Queue capacity of a world server connection.
pub const BACKEND_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Endpoint {0} is closed")]
    Closed(String),

    #[error("Can't connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Client,
    Backend,
}

impl EndpointKind {
    pub fn queue_capacity(self) -> usize {
        match self {
            EndpointKind::Client => CLIENT_QUEUE_CAPACITY,
            EndpointKind::Backend => BACKEND_QUEUE_CAPACITY,
        }
    }
}

/// One connection, owned by exactly one session.
#[derive(Debug)]
pub struct Endpoint {
    address: String,
    kind: EndpointKind,
    inbound: mpsc::Receiver<Frame>,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

/// Cloneable write handle of an [`Endpoint`], for work running outside the
/// endpoint owner.
#[derive(Debug, Clone)]
pub struct FrameSender {
    address: String,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

/// The far side of a channel-backed endpoint.
#[derive(Debug)]
pub struct EndpointPeer {
    /// Frames sent here arrive at [`Endpoint::recv`]. Dropping it closes the
    /// endpoint's inbound queue.
    pub to_endpoint: mpsc::Sender<Frame>,
    /// Frames passed to [`Endpoint::send`] arrive here.
    pub from_endpoint: mpsc::Receiver<Frame>,
}

impl Endpoint {
    /// Starts the read and write tasks over split halves of a connection.
    pub fn spawn<R, W>(
        address: impl Into<String>,
        kind: EndpointKind,
        reader: FramedRead<R, FrameDecoder>,
        writer: FramedWrite<W, FrameEncoder>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let address = address.into();
        let capacity = kind.queue_capacity();
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(address.clone(), reader, inbound_tx, cancel.clone()));
        tokio::spawn(write_loop(address.clone(), writer, outbound_rx, cancel.clone()));

        Self { address, kind, inbound: inbound_rx, outbound: outbound_tx, cancel }
    }

    /// Takes over a connection that was used with a full-duplex codec,
    /// keeping the codec state and any bytes already buffered.
    pub fn from_framed<S>(address: impl Into<String>, kind: EndpointKind, framed: Framed<S, FrameCodec>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let parts = framed.into_parts();
        let (decoder, encoder) = parts.codec.into_parts();
        let (read_half, write_half) = tokio::io::split(parts.io);

        let mut reader = FramedRead::new(read_half, decoder);
        *reader.read_buffer_mut() = parts.read_buf;
        let writer = FramedWrite::new(write_half, encoder);

        Self::spawn(address, kind, reader, writer)
    }

    /// Endpoint backed by plain channels, with no connection behind it.
    pub fn channel_pair(address: impl Into<String>, kind: EndpointKind) -> (Self, EndpointPeer) {
        let capacity = kind.queue_capacity();
        let (to_endpoint, inbound) = mpsc::channel(capacity);
        let (outbound, from_endpoint) = mpsc::channel(capacity);
        let endpoint = Self {
            address: address.into(),
            kind,
            inbound,
            outbound,
            cancel: CancellationToken::new(),
        };
        (endpoint, EndpointPeer { to_endpoint, from_endpoint })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Next inbound frame, or `None` once the endpoint is closed and frames
    /// read before the close are drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            frame = self.inbound.recv() => frame,
            _ = self.cancel.cancelled() => None,
        }
    }

    /// Queues `frame` for writing, waiting while the queue is full.
    pub async fn send(&self, frame: Frame) -> Result<(), EndpointError> {
        send_or_closed(&self.address, &self.outbound, &self.cancel, frame).await
    }

    pub fn sender(&self) -> FrameSender {
        FrameSender {
            address: self.address.clone(),
            outbound: self.outbound.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Stops both tasks. Frames still queued are discarded.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Closing {:?} endpoint {}", self.kind, self.address);
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl FrameSender {
    pub async fn send(&self, frame: Frame) -> Result<(), EndpointError> {
        send_or_closed(&self.address, &self.outbound, &self.cancel, frame).await
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn send_or_closed(
    address: &str,
    outbound: &mpsc::Sender<Frame>,
    cancel: &CancellationToken,
    frame: Frame,
) -> Result<(), EndpointError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(EndpointError::Closed(address.to_string())),
        sent = outbound.send(frame) => sent.map_err(|_| EndpointError::Closed(address.to_string())),
    }
}

async fn read_loop<R>(
    address: String,
    mut reader: FramedRead<R, FrameDecoder>,
    inbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(frame)) => {
                trace!("📥 {} from {} ({} bytes)", frame.opcode, address, frame.size());
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = inbound.send(frame) => if sent.is_err() { break },
                }
            }
            Some(Err(e)) => {
                warn!("⚠️ Read error on {}: {}", address, e);
                break;
            }
            None => {
                debug!("Connection {} closed by peer", address);
                break;
            }
        }
    }
    cancel.cancel();
}

async fn write_loop<W>(
    address: String,
    mut writer: FramedWrite<W, FrameEncoder>,
    mut outbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else { break };

        trace!("📤 {} to {} ({} bytes)", frame.opcode, address, frame.size());
        if let Err(e) = writer.send(frame).await {
            warn!("⚠️ Write error on {}: {}", address, e);
            break;
        }
    }
    cancel.cancel();
}
