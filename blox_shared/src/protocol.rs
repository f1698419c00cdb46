//! Wire protocol.
//!
//! Every message travels as an [`Envelope`] `{t, payload}` where `t` is the
//! message type and `payload` the bincode-encoded body. Envelopes are framed
//! on the stream with a big-endian `u32` length prefix.
//!
//! Replication sends one [`ComponentRecord`] `(entity_id, kind, payload)` per
//! component, so each tracked component serializes independently.

use anyhow::{bail, Context};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::{
    ecs::{Component, ComponentData, ComponentKind, EntityId},
    error::ProtocolError,
};

/// Upper bound for server to client frames. Snapshots of a large world are
/// the biggest messages on the wire.
pub const MAX_SERVER_FRAME: usize = 16 * 1024 * 1024;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client to server message types. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClientMessageType {
    Input = 0,
    ChatMessage = 1,
}

impl TryFrom<u8> for ClientMessageType {
    type Error = ProtocolError;

    fn try_from(t: u8) -> Result<Self, Self::Error> {
        match t {
            0 => Ok(ClientMessageType::Input),
            1 => Ok(ClientMessageType::ChatMessage),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Server to client message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerMessageType {
    FirstConnection = 0,
    Replication = 1,
}

impl TryFrom<u8> for ServerMessageType {
    type Error = ProtocolError;

    fn try_from(t: u8) -> Result<Self, Self::Error> {
        match t {
            0 => Ok(ServerMessageType::FirstConnection),
            1 => Ok(ServerMessageType::Replication),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Outer `{t, payload}` wrapper shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub t: u8,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn wrap<T: Serialize>(t: u8, body: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            t,
            payload: bincode::serialize(body)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn body<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

/// One tick's worth of controls from a player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct InputMessage {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub space: bool,
    pub interact: bool,
    /// Camera yaw in radians.
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

/// Sent once, right after connect: the id of the client's player entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMessage {
    pub id: EntityId,
}

/// A single serialized component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub entity_id: EntityId,
    pub kind: ComponentKind,
    pub payload: Vec<u8>,
}

impl ComponentRecord {
    pub fn from_component(component: &Component) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: component.entity_id(),
            kind: component.kind(),
            payload: component.data().encode_payload()?,
        })
    }

    pub fn decode(&self) -> Result<ComponentData, ProtocolError> {
        Ok(ComponentData::decode_payload(self.kind, &self.payload)?)
    }
}

/// A replicated component that was detached this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRecord {
    pub entity_id: EntityId,
    pub kind: ComponentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMode {
    /// Every tracked component of every live networked entity.
    Snapshot,
    /// Only components dirtied since the previous pass.
    Delta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationBatch {
    pub tick: u64,
    pub mode: ReplicationMode,
    pub records: Vec<ComponentRecord>,
    pub removed: Vec<RemovedRecord>,
}

impl ReplicationBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.removed.is_empty()
    }
}

/// Decoded client to server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Input(InputMessage),
    Chat(ChatMessage),
}

impl ClientMessage {
    pub fn message_type(&self) -> ClientMessageType {
        match self {
            ClientMessage::Input(_) => ClientMessageType::Input,
            ClientMessage::Chat(_) => ClientMessageType::ChatMessage,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let t = self.message_type() as u8;
        match self {
            ClientMessage::Input(m) => Envelope::wrap(t, m),
            ClientMessage::Chat(m) => Envelope::wrap(t, m),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.to_envelope()?.encode()
    }

    pub fn from_envelope(env: &Envelope) -> Result<Self, ProtocolError> {
        match ClientMessageType::try_from(env.t)? {
            ClientMessageType::Input => Ok(ClientMessage::Input(env.body()?)),
            ClientMessageType::ChatMessage => Ok(ClientMessage::Chat(env.body()?)),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_envelope(&Envelope::decode(bytes)?)
    }
}

/// Decoded server to client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    FirstConnection(ConnectionMessage),
    Replication(ReplicationBatch),
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let env = match self {
            ServerMessage::FirstConnection(m) => {
                Envelope::wrap(ServerMessageType::FirstConnection as u8, m)?
            }
            ServerMessage::Replication(b) => {
                Envelope::wrap(ServerMessageType::Replication as u8, b)?
            }
        };
        env.encode()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let env = Envelope::decode(bytes)?;
        match ServerMessageType::try_from(env.t)? {
            ServerMessageType::FirstConnection => Ok(ServerMessage::FirstConnection(env.body()?)),
            ServerMessageType::Replication => Ok(ServerMessage::Replication(env.body()?)),
        }
    }
}

/// Prefixes `payload` with its big-endian `u32` length.
pub fn encode_frame(payload: &[u8]) -> anyhow::Result<Bytes> {
    let len = u32::try_from(payload.len()).context("frame length overflows u32")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(len);
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream before the
/// length prefix.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> anyhow::Result<Option<Bytes>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len }.into());
    }
    let mut payload = BytesMut::zeroed(len);
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Some(payload.freeze()))
}

/// Cuts one complete frame off the front of `buf`, if there is one.
pub fn take_frame(buf: &mut BytesMut, max_len: usize) -> Result<Option<Bytes>, ProtocolError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }
    if buf.len() < 4 + len {
        buf.reserve(4 + len - buf.len());
        return Ok(None);
    }
    buf.advance(4);
    Ok(Some(buf.split_to(len).freeze()))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> anyhow::Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await.context("tcp write")?;
    Ok(())
}

/// Client side of the framed TCP transport.
///
/// Bytes are read into an internal buffer and frames are cut from it, so a
/// `recv` dropped by a timeout loses nothing.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
    inbox: BytesMut,
}

impl ReliableConn {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect {addr}"))?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok(Self {
            stream,
            inbox: BytesMut::new(),
        })
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> anyhow::Result<()> {
        let bytes = msg.encode().context("encode client message")?;
        write_frame(&mut self.stream, &bytes).await
    }

    /// Sends raw envelope bytes without validation.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.stream, bytes).await
    }

    /// Cancel safe.
    pub async fn recv(&mut self) -> anyhow::Result<ServerMessage> {
        loop {
            if let Some(frame) = take_frame(&mut self.inbox, MAX_SERVER_FRAME)? {
                return ServerMessage::decode(&frame).context("decode server message");
            }
            let n = self
                .stream
                .read_buf(&mut self.inbox)
                .await
                .context("tcp read")?;
            if n == 0 {
                bail!("server closed the connection");
            }
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Position, Text};

    #[test]
    fn unknown_client_type_is_rejected() {
        let env = Envelope {
            t: 42,
            payload: vec![],
        };
        let bytes = env.encode().unwrap();
        assert!(matches!(
            ClientMessage::decode(&bytes),
            Err(ProtocolError::UnknownMessageType(42))
        ));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let env = Envelope {
            t: ClientMessageType::ChatMessage as u8,
            payload: vec![9, 0, 0],
        };
        let bytes = env.encode().unwrap();
        assert!(matches!(
            ClientMessage::decode(&bytes),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn input_envelope_carries_type_tag() {
        let msg = ClientMessage::Input(InputMessage {
            up: true,
            angle: 1.5,
            ..Default::default()
        });
        let env = msg.to_envelope().unwrap();
        assert_eq!(env.t, 0);
        assert_eq!(ClientMessage::from_envelope(&env).unwrap(), msg);
    }

    #[test]
    fn record_decodes_to_component_data() {
        let c = Component::new(EntityId(5), Text::new("hi"));
        let rec = ComponentRecord::from_component(&c).unwrap();
        assert_eq!(rec.entity_id, EntityId(5));
        assert_eq!(rec.kind, ComponentKind::Text);
        assert_eq!(&rec.decode().unwrap(), c.data());
    }

    #[test]
    fn short_record_payload_is_malformed() {
        let rec = ComponentRecord {
            entity_id: EntityId(1),
            kind: ComponentKind::Position,
            payload: vec![0, 0],
        };
        assert!(matches!(rec.decode(), Err(ProtocolError::Malformed(_))));
        let ok = ComponentRecord::from_component(&Component::new(EntityId(1), Position::default()));
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn frames_round_trip_over_a_pipe() -> anyhow::Result<()> {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"hello").await?;
        drop(a);
        let frame = read_frame(&mut b, 16).await?;
        assert_eq!(frame.as_deref(), Some(&b"hello"[..]));
        assert!(read_frame(&mut b, 16).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn oversize_frame_is_rejected() -> anyhow::Result<()> {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, &[0u8; 32]).await?;
        let err = read_frame(&mut b, 8).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::FrameTooLarge { len: 32, max: 8 })
        ));
        Ok(())
    }

    #[test]
    fn take_frame_waits_for_the_whole_frame() -> anyhow::Result<()> {
        let whole = encode_frame(b"hello")?;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&whole[..6]);
        assert_eq!(take_frame(&mut buf, 64)?, None);
        buf.extend_from_slice(&whole[6..]);
        buf.extend_from_slice(&whole[..2]);
        assert_eq!(take_frame(&mut buf, 64)?.as_deref(), Some(&b"hello"[..]));
        assert_eq!(buf.len(), 2);
        assert!(matches!(
            take_frame(&mut BytesMut::from(&whole[..]), 2),
            Err(ProtocolError::FrameTooLarge { len: 5, max: 2 })
        ));
        Ok(())
    }
}
