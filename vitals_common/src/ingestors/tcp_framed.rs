//! # Framed TCP Adapter
//!
//! Each accepted connection gets its own task running `FrameCodec` over the
//! socket. Checksum-valid payloads are decoded as MessagePack maps; maps with a
//! non-empty string `sn` become `mattress` events keyed by that serial number.
//!
//! Malformed input never closes a connection. Only a read error, end of stream
//! or shutdown does.

use futures_util::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use super::IngestError;
use crate::core::{Dispatcher, Event, Source};
use crate::framing::{decode_payload, FrameCodec, FrameStats, Payload};

/// Event type given to every framed payload, whatever it contains.
pub const FRAMED_EVENT_TYPE: &str = "mattress";

/// Default listen port.
pub const DEFAULT_TCP_PORT: u16 = 5858;

/// Maps a decoded frame to an event. `None` when `sn` is missing, empty or not a string.
pub fn event_from_frame(payload: Payload) -> Option<Event> {
    let device_id = match payload.get("sn") {
        Some(Value::String(sn)) if !sn.is_empty() => sn.clone(),
        _ => return None,
    };
    Some(Event::new(device_id, FRAMED_EVENT_TYPE, payload, Source::Msgpack))
}

/// Runs the decode loop for one connection until EOF, a read error or `cancel`.
///
/// Returns the codec counters for the connection.
pub async fn serve_connection<R>(
    reader: R,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) -> FrameStats
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, FrameCodec::new());

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(bytes)) => match decode_payload(&bytes) {
                Ok(payload) => match event_from_frame(payload) {
                    Some(event) => {
                        dispatcher.dispatch(event).await;
                    }
                    None => tracing::debug!(%peer, "frame without usable sn dropped"),
                },
                Err(e) => tracing::debug!(%peer, error = %e, "frame payload not decodable"),
            },
            Some(Err(e)) => {
                tracing::warn!(%peer, error = %e, "tcp read failed, closing connection");
                break;
            }
            None => break,
        }
    }

    let stats = frames.decoder().stats();
    tracing::info!(
        %peer,
        frames = stats.frames,
        checksum_failures = stats.checksum_failures,
        empty_frames = stats.empty_frames,
        bytes_discarded = stats.bytes_discarded,
        "tcp connection closed"
    );
    stats
}

/// Accept loop for the framed transport.
pub struct TcpFramedIngestor {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl TcpFramedIngestor {
    /// Binds `addr`, e.g. `0.0.0.0:5858`.
    pub async fn bind(addr: &str, dispatcher: Arc<Dispatcher>) -> Result<Self, IngestError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr, "tcp listener bound");
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IngestError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `cancel` fires. Each connection runs in its own task.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), IngestError> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "tcp connection accepted");
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&self.dispatcher),
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "tcp accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        tracing::info!("tcp listener stopped");
        Ok(())
    }
}
