//! Framed TCP transport.
//!
//! The transport only moves bytes. Each accepted socket gets a reader task and
//! a writer task; everything they observe is reported to the server loop as a
//! [`TransportEvent`] over one channel, so the simulation is only ever touched
//! by the task that owns it.

use anyhow::Context;
use blox_shared::{
    config::EngineConfig,
    error::ProtocolError,
    protocol::{encode_frame, read_frame, ClientId},
};
use bytes::Bytes;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::AsyncWriteExt,
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Close codes, WebSocket numbering.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const TOO_BIG: u16 = 1009;
}

#[derive(Debug)]
pub enum TransportEvent {
    Open(ConnectionHandle),
    Message { client_id: ClientId, bytes: Bytes },
    Close { client_id: ClientId, code: u16, reason: String },
    /// Buffered outbound bytes fell back under the watermark.
    Drain { client_id: ClientId },
}

/// Sending half of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    client_id: ClientId,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Bytes>,
    buffered: Arc<AtomicUsize>,
    watermark: usize,
}

impl ConnectionHandle {
    /// Handle backed by a plain channel instead of a socket. The receiver
    /// yields complete frames, length prefix included.
    pub fn in_memory(client_id: ClientId, watermark: usize) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            client_id,
            peer: SocketAddr::from(([0, 0, 0, 0], 0)),
            tx,
            buffered: Arc::new(AtomicUsize::new(0)),
            watermark,
        };
        (handle, rx)
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues `payload` as one frame. Returns `false` when the frame could not
    /// be queued or the connection is over its backpressure watermark; the
    /// frame is still sent in the latter case.
    pub fn send(&self, payload: &[u8]) -> bool {
        let frame = match encode_frame(payload) {
            Ok(f) => f,
            Err(e) => {
                warn!(client_id = ?self.client_id, error = %e, "Cannot frame payload");
                return false;
            }
        };
        let len = frame.len();
        if self.tx.send(frame).is_err() {
            debug!(client_id = ?self.client_id, "Send on closed connection");
            return false;
        }
        let total = self.buffered.fetch_add(len, Ordering::AcqRel) + len;
        total <= self.watermark
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

/// Accept loop plus per-connection tasks.
pub struct TcpTransport {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_payload_len: usize,
    idle_timeout: Duration,
    watermark: usize,
}

impl TcpTransport {
    /// Binds the listener. A bind failure is fatal for the caller.
    pub async fn bind(
        cfg: &EngineConfig,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("tcp bind {addr}"))?;
        let local_addr = listener.local_addr().context("local_addr")?;
        if cfg.tls_enabled() {
            warn!("TLS material configured; terminate TLS in front of this listener");
        }

        let limits = Limits {
            max_payload_len: cfg.max_payload_len,
            idle_timeout: Duration::from_secs(cfg.idle_timeout_secs.max(1)),
            watermark: cfg.backpressure_watermark,
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, events_tx, limits));
        Ok((
            Self {
                local_addr,
                accept_task,
            },
            events_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<TransportEvent>,
    limits: Limits,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if events.is_closed() {
                    return;
                }
                spawn_connection(stream, peer, events.clone(), limits);
            }
            Err(e) => warn!(error = %e, "Accept failed"),
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<TransportEvent>,
    limits: Limits,
) {
    let client_id = ClientId::new_unique();
    if let Err(e) = stream.set_nodelay(true) {
        debug!(client_id = ?client_id, error = %e, "set_nodelay failed");
    }
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let buffered = Arc::new(AtomicUsize::new(0));

    let handle = ConnectionHandle {
        client_id,
        peer,
        tx,
        buffered: buffered.clone(),
        watermark: limits.watermark,
    };
    info!(client_id = ?client_id, %peer, "Connection opened");
    if events.send(TransportEvent::Open(handle)).is_err() {
        return;
    }

    tokio::spawn(write_loop(
        writer,
        rx,
        buffered,
        limits.watermark,
        client_id,
        events.clone(),
    ));

    tokio::spawn(async move {
        let (code, reason) = loop {
            let frame = tokio::time::timeout(
                limits.idle_timeout,
                read_frame(&mut reader, limits.max_payload_len),
            )
            .await;
            match frame {
                Err(_) => break (close_code::GOING_AWAY, "idle timeout".to_string()),
                Ok(Ok(None)) => break (close_code::NORMAL, String::new()),
                Ok(Ok(Some(bytes))) => {
                    if events
                        .send(TransportEvent::Message { client_id, bytes })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(Err(e)) => {
                    let code = match e.downcast_ref::<ProtocolError>() {
                        Some(ProtocolError::FrameTooLarge { .. }) => close_code::TOO_BIG,
                        _ => close_code::PROTOCOL_ERROR,
                    };
                    break (code, format!("{e:#}"));
                }
            }
        };
        debug!(client_id = ?client_id, code, %reason, "Reader finished");
        let _ = events.send(TransportEvent::Close {
            client_id,
            code,
            reason,
        });
    });
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    buffered: Arc<AtomicUsize>,
    watermark: usize,
    client_id: ClientId,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!(client_id = ?client_id, error = %e, "Write failed");
            break;
        }
        let before = buffered.fetch_sub(frame.len(), Ordering::AcqRel);
        let after = before.saturating_sub(frame.len());
        if before > watermark && after <= watermark {
            let _ = events.send(TransportEvent::Drain { client_id });
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use blox_shared::protocol::write_frame;

    fn test_cfg() -> EngineConfig {
        EngineConfig {
            server_addr: "127.0.0.1:0".to_string(),
            max_payload_len: 16,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn open_message_close_sequence() -> anyhow::Result<()> {
        let (transport, mut events) = TcpTransport::bind(&test_cfg()).await?;
        let mut client = TcpStream::connect(transport.local_addr()).await?;

        let TransportEvent::Open(handle) = events.recv().await.context("open")? else {
            anyhow::bail!("expected open");
        };
        write_frame(&mut client, b"ping").await?;
        match events.recv().await.context("message")? {
            TransportEvent::Message { client_id, bytes } => {
                assert_eq!(client_id, handle.client_id());
                assert_eq!(&bytes[..], b"ping");
            }
            other => anyhow::bail!("unexpected {other:?}"),
        }

        assert!(handle.send(b"pong"));
        let echoed = read_frame(&mut client, 64).await?;
        assert_eq!(echoed.as_deref(), Some(&b"pong"[..]));

        drop(client);
        match events.recv().await.context("close")? {
            TransportEvent::Close { code, .. } => assert_eq!(code, close_code::NORMAL),
            other => anyhow::bail!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn oversize_frame_closes_connection() -> anyhow::Result<()> {
        let (transport, mut events) = TcpTransport::bind(&test_cfg()).await?;
        let mut client = TcpStream::connect(transport.local_addr()).await?;
        let _open = events.recv().await;
        write_frame(&mut client, &[7u8; 64]).await?;
        match events.recv().await.context("close")? {
            TransportEvent::Close { code, .. } => assert_eq!(code, close_code::TOO_BIG),
            other => anyhow::bail!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn drain_fires_when_writer_falls_back_under_watermark() -> anyhow::Result<()> {
        let cfg = EngineConfig {
            backpressure_watermark: 16,
            ..test_cfg()
        };
        let (transport, mut events) = TcpTransport::bind(&cfg).await?;
        let mut client = TcpStream::connect(transport.local_addr()).await?;
        let TransportEvent::Open(handle) = events.recv().await.context("open")? else {
            anyhow::bail!("expected open");
        };

        assert!(!handle.send(&[7u8; 64]));
        assert_eq!(handle.buffered_bytes(), 68);
        match events.recv().await.context("drain")? {
            TransportEvent::Drain { client_id } => assert_eq!(client_id, handle.client_id()),
            other => anyhow::bail!("unexpected {other:?}"),
        }
        assert_eq!(handle.buffered_bytes(), 0);

        let delivered = read_frame(&mut client, 128).await?;
        assert_eq!(delivered.map(|b| b.len()), Some(64));
        Ok(())
    }

    #[test]
    fn in_memory_handle_reports_watermark() {
        let (handle, mut rx) = ConnectionHandle::in_memory(ClientId(1), 8);
        assert!(handle.send(b"abc"));
        assert!(!handle.send(b"defgh"));
        assert_eq!(handle.buffered_bytes(), 16);
        let first = rx.try_recv().unwrap();
        assert_eq!(&first[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
        drop(rx);
        assert!(!handle.send(b"x"));
    }

    #[tokio::test]
    async fn bind_failure_is_an_error() {
        let cfg = EngineConfig {
            server_addr: "not an address".to_string(),
            ..EngineConfig::default()
        };
        assert!(TcpTransport::bind(&cfg).await.is_err());
    }
}
