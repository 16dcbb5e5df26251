//! Fragmentation Tests - Large Message Transfer Tests
//!
//! These tests exercise GIOP fragmentation over TCP:
//! - Requests and replies larger than the fragment size, GIOP 1.1 and 1.2
//! - Both byte orders
//! - GIOP 1.0, which never fragments
//! - Fragmented transfers under concurrent load on one connection
//! - A hand-built three-fragment request read by the server

mod common;

use bytes::{Bytes, BytesMut};
use cdr::CdrContext;
use common::*;
use futures::future::join_all;
use giop::{
    ConnectionManagerConfig, GiopFrame, GiopHeader, GiopServerConfig, GiopTransport, GiopVersion,
    Message, ReplyStatus, RequestMessage, MIN_FRAGMENT_SIZE,
};
use iiop::{OrbClient, RawMarshaler};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const FRAGMENT_SIZE: usize = 256;

fn small_fragment_server_config() -> GiopServerConfig {
    GiopServerConfig {
        max_fragment_size: FRAGMENT_SIZE,
        ..Default::default()
    }
}

fn client_for(giop_version: GiopVersion, byte_order: CdrContext) -> OrbClient {
    OrbClient::builder()
        .config(ConnectionManagerConfig {
            giop_version,
            byte_order,
            max_fragment_size: FRAGMENT_SIZE,
            ..Default::default()
        })
        .build()
}

/// Test: large echo round trips in every version and byte order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_echo_all_versions() {
    init_logging();

    const PAYLOAD_SIZE: usize = 100_000;

    let server = start_server_with_config(TestServant, small_fragment_server_config()).await;
    let target = reference_to(&server.endpoint());
    let payload = pattern_bytes(PAYLOAD_SIZE);
    let expected_checksum = compute_checksum(&payload);

    for version in [GiopVersion::V1_0, GiopVersion::V1_1, GiopVersion::V1_2] {
        for byte_order in [CdrContext::big_endian(), CdrContext::little_endian()] {
            let client = client_for(version, byte_order);
            let start = Instant::now();
            let reply = client
                .invoke(&target, "echo", &RawMarshaler::new(), &payload[..])
                .await
                .unwrap();
            println!(
                "GIOP {} {:?}: {} bytes echoed in {:?}",
                version,
                byte_order,
                reply.len(),
                start.elapsed()
            );
            assert_eq!(reply.len(), PAYLOAD_SIZE);
            assert_eq!(compute_checksum(&reply), expected_checksum);
            client.shutdown().await;
        }
    }
}

/// Test: a small request producing a large fragmented reply
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_reply_fragmentation() {
    init_logging();

    const REPLY_SIZE: u32 = 1_000_000;

    let server = start_server_with_config(TestServant, small_fragment_server_config()).await;
    let client = client_for(GiopVersion::V1_2, CdrContext::big_endian());

    let reply = client
        .invoke(
            &reference_to(&server.endpoint()),
            "generate",
            &RawMarshaler::new(),
            &u32_payload(REPLY_SIZE)[..],
        )
        .await
        .unwrap();
    assert_eq!(reply, pattern_bytes(REPLY_SIZE as usize));
}

/// Test: concurrent fragmented requests interleave on one connection
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fragmented_requests() {
    init_logging();

    const NUM_REQUESTS: usize = 20;

    let server = start_server_with_config(TestServant, small_fragment_server_config()).await;
    let client = Arc::new(client_for(GiopVersion::V1_2, CdrContext::little_endian()));
    let target = reference_to(&server.endpoint());

    let calls = (0..NUM_REQUESTS).map(|i| {
        let client = Arc::clone(&client);
        let target = target.clone();
        async move {
            let payload = TestDataGenerator::new(i as u64).random_bytes(1000 + i * 997);
            let reply = client
                .invoke(&target, "echo", &RawMarshaler::new(), &payload[..])
                .await
                .unwrap();
            compute_checksum(&reply) == compute_checksum(&payload) && reply.len() == payload.len()
        }
    });
    let results = join_all(calls).await;
    assert!(results.iter().all(|ok| *ok));
    assert_eq!(client.manager().stats().connections, 1);
}

/// Test: a request split by hand into three frames is reassembled
/// bit-for-bit before dispatch
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_fragment_request_over_tcp() {
    init_logging();

    let server = start_server(TestServant).await;
    let ctx = CdrContext::big_endian();
    let payload = pattern_bytes(3 * MIN_FRAGMENT_SIZE);

    let mut request = RequestMessage::new(Bytes::from_static(ECHO_KEY), "echo", Bytes::new());
    request.request_id = 77;
    let offset = request.body_offset(GiopVersion::V1_2, ctx).unwrap();
    request.body = payload.clone();
    assert_eq!(offset % 8, 0);

    let whole = Message::Request(request)
        .encode(GiopVersion::V1_2, ctx)
        .unwrap();
    let frames = split_into_three(&whole);

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    for frame in &frames {
        stream.write_all(&frame.encode()).await.unwrap();
    }

    let mut transport = GiopTransport::new(stream);
    let frame = transport.read_message().await.unwrap();
    match Message::decode(&frame).unwrap() {
        Message::Reply(reply) => {
            assert_eq!(reply.request_id, 77);
            assert_eq!(reply.reply_status, ReplyStatus::NoException);
            assert_eq!(reply.body, payload);
        }
        other => panic!("expected reply, got {:?}", other),
    }
}

/// Cut a 1.2 message into a first frame and two Fragment frames, each
/// continuation carrying the request id.
fn split_into_three(whole: &GiopFrame) -> Vec<GiopFrame> {
    let body = &whole.body;
    let third = body.len() / 3;
    let cut1 = third - third % 8;
    let cut2 = cut1 + third - third % 8;

    let mut first_header = whole.header;
    first_header.flags.set_more_fragments(true);
    let first = GiopFrame::new(first_header, body.slice(..cut1)).unwrap();

    let fragment = |chunk: &[u8], more: bool| {
        let mut header = GiopHeader::new(
            GiopVersion::V1_2,
            CdrContext::big_endian(),
            giop::MessageType::Fragment,
        );
        header.flags.set_more_fragments(more);
        let mut data = BytesMut::new();
        data.extend_from_slice(&77u32.to_be_bytes());
        data.extend_from_slice(chunk);
        GiopFrame::new(header, data.freeze()).unwrap()
    };

    vec![
        first,
        fragment(&body[cut1..cut2], true),
        fragment(&body[cut2..], false),
    ]
}
