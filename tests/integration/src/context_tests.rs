//! Context and Policy Tests - Per-Call State Across The Wire
//!
//! These tests exercise call-context propagation and per-call policies:
//! - Concurrent invocations each see only their own context
//! - Context does not leak into calls made outside its scope
//! - Request timeouts that leave the connection usable
//! - Client-wide policies overridden per call

mod common;

use common::*;
use futures::future::join_all;
use giop::{CallContext, GiopError, PolicySet, RequestTimeoutPolicy};
use iiop::{OrbClient, OrbError, RawMarshaler};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Test: many concurrent scopes over one pooled connection
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_contexts_isolated() {
    init_logging();

    const NUM_CALLS: usize = 50;

    let server = start_server(TestServant).await;
    let client = Arc::new(OrbClient::new());
    let target = reference_to(&server.endpoint());

    let calls = (0..NUM_CALLS).map(|i| {
        let client = Arc::clone(&client);
        let target = target.clone();
        let context = CallContext::new().with("key", format!("caller-{}", i));
        tokio::spawn(context.scope(async move {
            let reply = client
                .invoke(&target, "context", &RawMarshaler::new(), &b""[..])
                .await
                .unwrap();
            (i, String::from_utf8(reply.to_vec()).unwrap())
        }))
    });

    for result in join_all(calls).await {
        let (i, seen) = result.unwrap();
        assert_eq!(seen, format!("caller-{}", i));
    }
    assert_eq!(client.manager().stats().connections, 1);
}

/// Test: nested scopes replace the outer context; leaving a scope restores it
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_context_scoping() {
    init_logging();

    let server = start_server(TestServant).await;
    let client = OrbClient::new();
    let target = reference_to(&server.endpoint());
    let marshaler = RawMarshaler::new();

    let outer = CallContext::new().with("key", "outer");
    let inner = CallContext::new().with("key", "inner");

    let (before, during, after) = outer
        .scope(async {
            let before = client.invoke(&target, "context", &marshaler, &b""[..]).await.unwrap();
            let during = inner
                .scope(client.invoke(&target, "context", &marshaler, &b""[..]))
                .await
                .unwrap();
            let after = client.invoke(&target, "context", &marshaler, &b""[..]).await.unwrap();
            (before, during, after)
        })
        .await;
    assert_eq!(&before[..], b"outer");
    assert_eq!(&during[..], b"inner");
    assert_eq!(&after[..], b"outer");

    let outside = client.invoke(&target, "context", &marshaler, &b""[..]).await.unwrap();
    assert!(outside.is_empty());
}

/// Test: a slow call times out without tearing down the connection
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_timeout_keeps_connection() {
    init_logging();

    let server = start_server(TestServant).await;
    let client = OrbClient::new();
    let target = reference_to(&server.endpoint());
    let marshaler = RawMarshaler::new();

    let short = PolicySet::new().with(RequestTimeoutPolicy(Duration::from_millis(100)));
    let start = Instant::now();
    let err = client
        .invoke_with(&target, "sleep", &marshaler, &u32_payload(2_000)[..], &short)
        .await
        .unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(1));
    match err {
        OrbError::Giop(GiopError::Timeout { endpoint, .. }) => {
            assert_eq!(endpoint, server.endpoint())
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    let conn = client.manager().pooled(&server.endpoint()).unwrap();
    assert!(conn.is_healthy());
    let reply = client
        .invoke(&target, "echo", &marshaler, &b"still here"[..])
        .await
        .unwrap();
    assert_eq!(&reply[..], b"still here");
    assert_eq!(client.manager().stats().connections, 1);
}

/// Test: the client-wide timeout applies unless a call overrides it
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_policy_override() {
    init_logging();

    let server = start_server(TestServant).await;
    let client = OrbClient::builder()
        .policy(RequestTimeoutPolicy(Duration::from_millis(50)))
        .build();
    let target = reference_to(&server.endpoint());
    let marshaler = RawMarshaler::new();

    let err = client
        .invoke(&target, "sleep", &marshaler, &u32_payload(300)[..])
        .await
        .unwrap_err();
    assert!(matches!(err, OrbError::Giop(GiopError::Timeout { .. })));

    let patient = PolicySet::new().with(RequestTimeoutPolicy(Duration::from_secs(5)));
    let reply = client
        .invoke_with(&target, "sleep", &marshaler, &u32_payload(300)[..], &patient)
        .await
        .unwrap();
    assert_eq!(reply, u32_payload(300));
}
