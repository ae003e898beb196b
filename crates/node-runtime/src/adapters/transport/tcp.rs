//! TCP peer transport.
//!
//! ## Frame
//!
//! ```text
//! [len: u32 BE][sender node id: 16B][consensus message bytes]
//!               \__________________ len bytes ___________/
//! ```
//!
//! Each peer gets one outbound connection owned by a writer task fed through
//! a bounded queue; `send` and `broadcast` never block the consensus loop.
//! A write failure drops the frame in hand and reconnects. Inbound
//! connections are read by one task each; an oversized frame closes the
//! connection, an undecodable message is dropped and the connection kept.

use ql_04_consensus::{
    codec, ConsensusApi, ConsensusError, ConsensusMessage, PeerTransport, TransportError,
    WireHints,
};
use shared_types::NodeId;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SENDER_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub local: NodeId,
    pub peers: Vec<(NodeId, SocketAddr)>,
    pub hints: WireHints,
    /// Frames queued per peer before `send` reports the peer unreachable.
    pub queue_capacity: usize,
    pub reconnect_delay: Duration,
}

impl TcpTransportConfig {
    pub fn new(local: NodeId, peers: Vec<(NodeId, SocketAddr)>, hints: WireHints) -> Self {
        Self {
            local,
            peers,
            hints,
            queue_capacity: 256,
            reconnect_delay: Duration::from_millis(200),
        }
    }
}

/// [`PeerTransport`] over persistent TCP connections.
pub struct TcpTransport {
    local: NodeId,
    hints: WireHints,
    writers: HashMap<NodeId, mpsc::Sender<Vec<u8>>>,
}

impl TcpTransport {
    /// Start one writer task per peer. Must be called inside a tokio runtime.
    pub fn connect(config: TcpTransportConfig) -> Self {
        let mut writers = HashMap::with_capacity(config.peers.len());
        for (peer, address) in &config.peers {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            tokio::spawn(run_writer(*peer, *address, rx, config.reconnect_delay));
            writers.insert(*peer, tx);
        }
        Self {
            local: config.local,
            hints: config.hints,
            writers,
        }
    }

    fn enqueue(&self, peer: NodeId, frame: Vec<u8>) -> Result<(), TransportError> {
        let writer = self
            .writers
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        writer
            .try_send(frame)
            .map_err(|e| TransportError::Unreachable {
                peer,
                reason: match e {
                    mpsc::error::TrySendError::Full(_) => "send queue full".to_string(),
                    mpsc::error::TrySendError::Closed(_) => "writer stopped".to_string(),
                },
            })
    }
}

impl PeerTransport for TcpTransport {
    fn broadcast(&self, message: &ConsensusMessage) -> Result<(), TransportError> {
        let frame = encode_frame(self.local, &codec::encode_with(message, self.hints)?);
        for peer in self.writers.keys() {
            if let Err(e) = self.enqueue(*peer, frame.clone()) {
                warn!(peer = %peer, error = %e, "broadcast skipped peer");
            }
        }
        Ok(())
    }

    fn send(&self, peer: NodeId, message: &ConsensusMessage) -> Result<(), TransportError> {
        let frame = encode_frame(self.local, &codec::encode_with(message, self.hints)?);
        self.enqueue(peer, frame)
    }
}

async fn run_writer(
    peer: NodeId,
    address: SocketAddr,
    mut frames: mpsc::Receiver<Vec<u8>>,
    reconnect_delay: Duration,
) {
    let mut stream: Option<TcpStream> = None;
    while let Some(frame) = frames.recv().await {
        if stream.is_none() {
            match TcpStream::connect(address).await {
                Ok(connected) => {
                    let _ = connected.set_nodelay(true);
                    debug!(peer = %peer, %address, "peer connection established");
                    stream = Some(connected);
                }
                Err(e) => {
                    debug!(peer = %peer, %address, error = %e, "peer unreachable, frame dropped");
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            }
        }
        if let Some(connection) = stream.as_mut() {
            if let Err(e) = connection.write_all(&frame).await {
                warn!(peer = %peer, error = %e, "peer write failed, reconnecting");
                stream = None;
            }
        }
    }
    debug!(peer = %peer, "peer writer stopped");
}

/// Accept peer connections on `listener` and feed their frames to `api`.
pub fn spawn_listener(
    listener: TcpListener,
    api: Arc<dyn ConsensusApi>,
    max_frame_bytes: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(address) = listener.local_addr() {
            info!(%address, "consensus listener started");
        }
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    let api = Arc::clone(&api);
                    tokio::spawn(async move {
                        match read_connection(stream, api, max_frame_bytes).await {
                            Ok(()) => debug!(%remote, "peer connection closed"),
                            Err(e) => warn!(%remote, error = %e, "peer connection dropped"),
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    })
}

async fn read_connection(
    mut stream: TcpStream,
    api: Arc<dyn ConsensusApi>,
    max_frame_bytes: usize,
) -> io::Result<()> {
    while let Some((sender, message)) = read_frame(&mut stream, max_frame_bytes).await? {
        match api.on_consensus_message(sender, &message) {
            Ok(()) | Err(ConsensusError::Codec(_)) => {}
            Err(ConsensusError::ServiceStopped) => return Ok(()),
            Err(e) => debug!(peer = %sender, error = %e, "inbound message refused"),
        }
    }
    Ok(())
}

pub fn encode_frame(sender: NodeId, message: &[u8]) -> Vec<u8> {
    let body_len = SENDER_LEN + message.len();
    let mut frame = Vec::with_capacity(4 + body_len);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.extend_from_slice(sender.as_bytes());
    frame.extend_from_slice(message);
    frame
}

/// Read one frame. `Ok(None)` on a clean close between frames.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> io::Result<Option<(NodeId, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let body_len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if body_len < SENDER_LEN || body_len > max_frame_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {body_len} bytes outside {SENDER_LEN}..={max_frame_bytes}"),
        ));
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;
    let message = body.split_off(SENDER_LEN);
    let mut sender = [0u8; SENDER_LEN];
    sender.copy_from_slice(&body);
    Ok(Some((NodeId(sender), message)))
}
