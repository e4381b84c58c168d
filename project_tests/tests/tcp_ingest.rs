use project_tests::{Harness, msgpack_frame};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use vitals_common::core::Source;
use vitals_common::ingestors::{TcpFramedIngestor, serve_connection};

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// Yields `data` once, then fails every later read.
struct BrokenPipe {
    data: Option<Vec<u8>>,
}

impl AsyncRead for BrokenPipe {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))),
        }
    }
}

#[tokio::test]
async fn serial_number_frame_becomes_mattress_event() {
    let harness = Harness::new();
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = tokio::spawn(serve_connection(
        server,
        peer(),
        harness.dispatcher.clone(),
        harness.cancel.child_token(),
    ));

    client.write_all(&msgpack_frame(json!({"sn": "X"}))).await.unwrap();
    drop(client);

    let stats = conn.await.unwrap();
    let events = harness.wait_for_events(1).await;

    assert_eq!(stats.frames, 1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, "X");
    assert_eq!(events[0].event_type, "mattress");
    assert_eq!(events[0].source, Source::Msgpack);
}

#[tokio::test]
async fn corrupt_and_unusable_frames_do_not_close_the_connection() {
    let harness = Harness::new();
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = tokio::spawn(serve_connection(
        server,
        peer(),
        harness.dispatcher.clone(),
        harness.cancel.child_token(),
    ));

    let mut corrupt = msgpack_frame(json!({"sn": "bad"}));
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x01;

    // Garbage and the first frame share one write, so the magic is never split from it.
    let mut lead = b"\x00\x13garbage".to_vec();
    lead.extend_from_slice(&msgpack_frame(json!({"sn": "first"})));
    client.write_all(&lead).await.unwrap();

    let mut rest = Vec::new();
    rest.extend_from_slice(&corrupt);
    rest.extend_from_slice(&[0xAB, 0xCD, 0x00, 0x7F]);
    rest.extend_from_slice(&msgpack_frame(json!({"no_sn": true})));
    rest.extend_from_slice(&msgpack_frame(json!({"sn": "second", "heart_rate": 70})));

    // Byte-at-a-time delivery exercises reassembly across reads.
    for byte in rest {
        client.write_all(&[byte]).await.unwrap();
    }
    drop(client);

    let stats = conn.await.unwrap();
    let events = harness.wait_for_events(2).await;

    let mut ids: Vec<_> = events.iter().map(|e| e.device_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["first", "second"]);
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.checksum_failures, 1);
    assert_eq!(stats.empty_frames, 1);
}

#[tokio::test]
async fn listener_accepts_concurrent_connections() {
    let harness = Harness::new();
    let ingestor = TcpFramedIngestor::bind("127.0.0.1:0", harness.dispatcher.clone())
        .await
        .unwrap();
    let addr = ingestor.local_addr().unwrap();
    let listener = tokio::spawn(ingestor.run(harness.cancel.child_token()));

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();
    a.write_all(&msgpack_frame(json!({"sn": "mat-a"}))).await.unwrap();
    b.write_all(&msgpack_frame(json!({"sn": "mat-b"}))).await.unwrap();

    let events = harness.wait_for_events(2).await;
    let mut ids: Vec<_> = events.iter().map(|e| e.device_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["mat-a", "mat-b"]);

    harness.cancel.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(2), listener).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn mattress_events_are_not_stored_as_metrics() {
    let harness = Harness::new();
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = tokio::spawn(serve_connection(
        server,
        peer(),
        harness.dispatcher.clone(),
        harness.cancel.child_token(),
    ));

    client
        .write_all(&msgpack_frame(json!({"sn": "m1", "user_id": "u1", "heart_rate": 72})))
        .await
        .unwrap();
    drop(client);
    conn.await.unwrap();

    // The recorder runs after the metric handlers, so they are done too.
    assert_eq!(harness.wait_for_events(1).await.len(), 1);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn read_error_closes_only_that_connection() {
    let harness = Harness::new();
    let broken = BrokenPipe {
        data: Some(msgpack_frame(json!({"sn": "before-reset"}))),
    };

    let stats = tokio::time::timeout(
        Duration::from_secs(2),
        serve_connection(broken, peer(), harness.dispatcher.clone(), harness.cancel.child_token()),
    )
    .await
    .expect("read error ends the connection loop");
    assert_eq!(stats.frames, 1);
    assert_eq!(harness.wait_for_events(1).await[0].device_id, "before-reset");

    // The shared dispatcher keeps serving other connections.
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = tokio::spawn(serve_connection(
        server,
        peer(),
        harness.dispatcher.clone(),
        harness.cancel.child_token(),
    ));
    client.write_all(&msgpack_frame(json!({"sn": "after-reset"}))).await.unwrap();
    drop(client);
    conn.await.unwrap();

    let mut ids: Vec<_> = harness
        .wait_for_events(2)
        .await
        .into_iter()
        .map(|e| e.device_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["after-reset", "before-reset"]);
}
