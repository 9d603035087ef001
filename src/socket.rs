// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket abstractions for the backend and client sides of a session.
//!
//! The pumps (`backend_pump.rs`, `client_pump.rs`) and the coordinator are
//! written against these traits rather than concrete `tokio-tungstenite` /
//! `axum` websocket types, following the teacher's practice of putting
//! traits at transport seams (`upstream/bridge.rs`'s `WsBridge`). Production
//! wires the concrete adapters below; tests use the in-memory fakes.

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::MaybeTlsStream;

/// A transport-agnostic frame. Only the shapes the core cares about are
/// modeled; ping/pong is handled inside the concrete adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

impl Frame {
    /// The bytes that get written to the outbox / broadcast to clients,
    /// regardless of whether the backend sent text or binary.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Frame::Text(s) => s.into_bytes(),
            Frame::Binary(b) => b,
            Frame::Close => Vec::new(),
        }
    }
}

#[async_trait]
pub trait BackendReader: Send {
    /// `Ok(None)` signals a clean close.
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>>;
}

#[async_trait]
pub trait BackendWriter: Send {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ClientReader: Send {
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>>;
}

#[async_trait]
pub trait ClientWriter: Send {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

// -- tokio-tungstenite adapters (backend side) -------------------------------

type TungsteniteStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TungsteniteReader(SplitStream<TungsteniteStream>);
pub struct TungsteniteWriter(SplitSink<TungsteniteStream, TungsteniteMessage>);

pub fn split_backend(stream: TungsteniteStream) -> (TungsteniteReader, TungsteniteWriter) {
    let (sink, stream) = stream.split();
    (TungsteniteReader(stream), TungsteniteWriter(sink))
}

#[async_trait]
impl BackendReader for TungsteniteReader {
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>> {
        loop {
            match self.0.next().await {
                None => return Ok(None),
                Some(Ok(TungsteniteMessage::Text(t))) => return Ok(Some(Frame::Text(t.to_string()))),
                Some(Ok(TungsteniteMessage::Binary(b))) => return Ok(Some(Frame::Binary(b.to_vec()))),
                Some(Ok(TungsteniteMessage::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame, handled by tungstenite internally
                Some(Err(e)) => return Err(anyhow::anyhow!("backend read error: {e}")),
            }
        }
    }
}

#[async_trait]
impl BackendWriter for TungsteniteWriter {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        let message = match frame {
            Frame::Text(t) => TungsteniteMessage::Text(t.into()),
            Frame::Binary(b) => TungsteniteMessage::Binary(b.into()),
            Frame::Close => TungsteniteMessage::Close(None),
        };
        self.0.send(message).await.map_err(|e| anyhow::anyhow!("backend write error: {e}"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.0
            .send(TungsteniteMessage::Close(None))
            .await
            .map_err(|e| anyhow::anyhow!("backend close error: {e}"))
    }
}

// -- axum adapters (client side) ---------------------------------------------

pub struct AxumReader(SplitStream<WebSocket>);
pub struct AxumWriter(SplitSink<WebSocket, AxumMessage>);

pub fn split_client(socket: WebSocket) -> (AxumReader, AxumWriter) {
    let (sink, stream) = socket.split();
    (AxumReader(stream), AxumWriter(sink))
}

#[async_trait]
impl ClientReader for AxumReader {
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>> {
        loop {
            match self.0.next().await {
                None => return Ok(None),
                Some(Ok(AxumMessage::Text(t))) => return Ok(Some(Frame::Text(t.to_string()))),
                Some(Ok(AxumMessage::Binary(b))) => return Ok(Some(Frame::Binary(b.to_vec()))),
                Some(Ok(AxumMessage::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(anyhow::anyhow!("client read error: {e}")),
            }
        }
    }
}

#[async_trait]
impl ClientWriter for AxumWriter {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        let message = match frame {
            Frame::Text(t) => AxumMessage::Text(t.into()),
            Frame::Binary(b) => AxumMessage::Binary(b.into()),
            Frame::Close => AxumMessage::Close(None),
        };
        self.0.send(message).await.map_err(|e| anyhow::anyhow!("client write error: {e}"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.0.send(AxumMessage::Close(None)).await.map_err(|e| anyhow::anyhow!("client close error: {e}"))
    }
}

// -- in-memory fakes, for tests ----------------------------------------------

pub struct ChannelReader(pub mpsc::UnboundedReceiver<Frame>);
pub struct ChannelWriter(pub mpsc::UnboundedSender<Frame>);

/// Builds a connected pair: writing to the returned sender is observed by
/// the reader half handed to the code under test.
pub fn channel_pair() -> (ChannelWriter, ChannelReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelWriter(tx), ChannelReader(rx))
}

#[async_trait]
impl BackendReader for ChannelReader {
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(self.0.recv().await)
    }
}

#[async_trait]
impl ClientReader for ChannelReader {
    async fn recv(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(self.0.recv().await)
    }
}

#[async_trait]
impl BackendWriter for ChannelWriter {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        self.0.send(frame).map_err(|_| anyhow::anyhow!("channel closed"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ClientWriter for ChannelWriter {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        self.0.send(frame).map_err(|_| anyhow::anyhow!("channel closed"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
