//! Transport-neutral frame model.
//!
//! The client leg is an axum `WebSocket`, the upstream leg a tokio-tungstenite
//! `WebSocketStream`. Both are adapted into a `FrameTransport` so the relay is
//! written once, against a single frame type.

use axum::body::Bytes;
use axum::extract::ws::{self, WebSocket};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::websocket::close::CloseEvent;
use crate::websocket::error::ProxyError;

/// One WebSocket message as seen by the relay.
///
/// Payloads are moved from the receiving leg to the sending leg; nothing is
/// shared between the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseEvent>),
}

impl Frame {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }
}

/// A duplex stream of frames: what the relay pumps between.
pub trait FrameTransport:
    Stream<Item = Result<Frame, ProxyError>> + Sink<Frame, Error = ProxyError> + Send + Unpin + 'static
{
}

impl<T> FrameTransport for T where
    T: Stream<Item = Result<Frame, ProxyError>>
        + Sink<Frame, Error = ProxyError>
        + Send
        + Unpin
        + 'static
{
}

// Client leg (axum)

impl From<ws::Message> for Frame {
    fn from(message: ws::Message) -> Self {
        match message {
            ws::Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            ws::Message::Binary(data) => Frame::Binary(data),
            ws::Message::Ping(data) => Frame::Ping(data),
            ws::Message::Pong(data) => Frame::Pong(data),
            ws::Message::Close(frame) => Frame::Close(
                frame.map(|f| CloseEvent::new(f.code, f.reason.as_str())),
            ),
        }
    }
}

impl From<Frame> for ws::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ws::Message::Text(text.into()),
            Frame::Binary(data) => ws::Message::Binary(data),
            Frame::Ping(data) => ws::Message::Ping(data),
            Frame::Pong(data) => ws::Message::Pong(data),
            Frame::Close(event) => ws::Message::Close(event.map(|e| ws::CloseFrame {
                code: e.code,
                reason: e.reason.into(),
            })),
        }
    }
}

// Upstream leg (tungstenite)

impl TryFrom<Message> for Frame {
    type Error = ProxyError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        Ok(match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data),
            Message::Ping(data) => Frame::Ping(data),
            Message::Pong(data) => Frame::Pong(data),
            Message::Close(frame) => Frame::Close(
                frame.map(|f| CloseEvent::new(u16::from(f.code), f.reason.as_str())),
            ),
            Message::Frame(_) => return Err(ProxyError::UnexpectedFrame),
        })
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close(event) => Message::Close(event.map(|e| CloseFrame {
                code: CloseCode::from(e.code),
                reason: e.reason.into(),
            })),
        }
    }
}

/// Adapt the accepted client socket into a frame transport.
pub fn client_transport(socket: WebSocket) -> impl FrameTransport {
    socket
        .with(|frame: Frame| future::ready(Ok::<_, ProxyError>(ws::Message::from(frame))))
        .map(|message| message.map(Frame::from).map_err(ProxyError::from))
}

/// Adapt a tungstenite stream (the dialed upstream, or any raw socket in tests).
pub fn upstream_transport<S>(stream: WebSocketStream<S>) -> impl FrameTransport
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    stream
        .with(|frame: Frame| future::ready(Ok::<_, ProxyError>(Message::from(frame))))
        .map(|message| message.map_err(ProxyError::from).and_then(Frame::try_from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_codes_survive_both_legs() {
        let frame = Frame::Close(Some(CloseEvent::new(4002, "kicked")));

        let upstream: Message = frame.clone().into();
        assert_eq!(Frame::try_from(upstream).unwrap(), frame);

        let client: ws::Message = frame.clone().into();
        assert_eq!(Frame::from(client), frame);
    }

    #[test]
    fn test_empty_close_stays_empty() {
        let upstream: Message = Frame::Close(None).into();
        assert!(matches!(upstream, Message::Close(None)));
    }

    #[test]
    fn test_frame_kind_labels() {
        assert_eq!(Frame::Text("hi".into()).kind(), "text");
        assert_eq!(Frame::Binary(Bytes::from_static(b"\x01")).kind(), "binary");
        assert_eq!(Frame::Close(None).kind(), "close");
    }
}
