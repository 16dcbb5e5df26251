//! Failover Tests - Ordered Endpoint Failover Over TCP
//!
//! These tests exercise alternate-address failover with real sockets:
//! - Dead primary and first alternate, live second alternate
//! - Every endpoint dead
//! - Alternates disabled by policy
//! - Failover attempt limits
//! - Eviction of a connection whose server went away

mod common;

use common::*;
use giop::{
    ConnectionManagerConfig, GiopError, MaxFailoverAttemptsPolicy, UseAlternateAddressesPolicy,
};
use iiop::{OrbClient, OrbError, RawMarshaler};
use std::time::Duration;

fn counting_client(connector: CountingConnector) -> OrbClient<CountingConnector> {
    OrbClient::builder()
        .connector(connector)
        .config(ConnectionManagerConfig {
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .build()
}

/// Test: primary and first alternate refuse, second alternate answers
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failover_to_second_alternate() {
    init_logging();

    let server = start_server(TestServant).await;
    let e0 = unreachable_endpoint().await;
    let a1 = unreachable_endpoint().await;
    let a2 = server.endpoint();
    let target = reference_with_alternates(&e0, &[a1.clone(), a2.clone()]);

    let connector = CountingConnector::default();
    let client = counting_client(connector.clone());

    let reply = client
        .invoke(&target, "echo", &RawMarshaler::new(), &b"failover"[..])
        .await
        .unwrap();
    assert_eq!(&reply[..], b"failover");
    assert_eq!(connector.attempts(), vec![e0, a1, a2.clone()]);

    // The live connection is pooled; a second call opens nothing new
    client
        .invoke(&target, "echo", &RawMarshaler::new(), &b"again"[..])
        .await
        .unwrap();
    assert_eq!(connector.attempts().len(), 3 + 2);
    assert!(client.manager().pooled(&a2).is_some());
}

/// Test: no endpoint answers; exactly one attempt per endpoint
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_endpoints_unreachable() {
    init_logging();

    let e0 = unreachable_endpoint().await;
    let a1 = unreachable_endpoint().await;
    let a2 = unreachable_endpoint().await;
    let target = reference_with_alternates(&e0, &[a1, a2.clone()]);

    let connector = CountingConnector::default();
    let client = counting_client(connector.clone());

    let err = client
        .invoke(&target, "echo", &RawMarshaler::new(), &b""[..])
        .await
        .unwrap_err();
    match err {
        OrbError::Giop(GiopError::AllEndpointsUnreachable {
            attempts,
            last_endpoint,
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_endpoint, Some(a2));
        }
        other => panic!("expected AllEndpointsUnreachable, got {:?}", other),
    }
    assert_eq!(connector.attempts().len(), 3);
    assert_eq!(client.manager().stats().connections, 0);
}

/// Test: with alternates disabled only the primary is tried
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_alternates_disabled() {
    init_logging();

    let server = start_server(TestServant).await;
    let e0 = unreachable_endpoint().await;
    let target = reference_with_alternates(&e0, &[server.endpoint()]);

    let connector = CountingConnector::default();
    let client = OrbClient::builder()
        .connector(connector.clone())
        .policy(UseAlternateAddressesPolicy(false))
        .build();

    let err = client
        .invoke(&target, "echo", &RawMarshaler::new(), &b""[..])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrbError::Giop(GiopError::AllEndpointsUnreachable { attempts: 1, .. })
    ));
    assert_eq!(connector.attempts(), vec![e0]);
}

/// Test: per-call attempt limit stops before the live endpoint
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failover_attempt_limit() {
    init_logging();

    let server = start_server(TestServant).await;
    let e0 = unreachable_endpoint().await;
    let a1 = unreachable_endpoint().await;
    let target = reference_with_alternates(&e0, &[a1, server.endpoint()]);

    let connector = CountingConnector::default();
    let client = counting_client(connector.clone());

    let limited = giop::PolicySet::new().with(MaxFailoverAttemptsPolicy(2));
    let err = client
        .invoke_with(&target, "echo", &RawMarshaler::new(), &b""[..], &limited)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrbError::Giop(GiopError::AllEndpointsUnreachable { attempts: 2, .. })
    ));

    // Without the override the third endpoint is reached
    client
        .invoke(&target, "echo", &RawMarshaler::new(), &b""[..])
        .await
        .unwrap();
    assert_eq!(connector.attempts().len(), 2 + 3);
}

/// Test: a connection whose server died is evicted, and the next call
/// fails over to the alternate
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dead_connection_evicted() {
    init_logging();

    let primary = start_server(TestServant).await;
    let backup = start_server(TestServant).await;
    let target = reference_with_alternates(&primary.endpoint(), &[backup.endpoint()]);

    let connector = CountingConnector::default();
    let client = counting_client(connector.clone());
    let marshaler = RawMarshaler::new().idempotent("echo");

    client
        .invoke(&target, "echo", &marshaler, &b"one"[..])
        .await
        .unwrap();
    assert!(client.manager().pooled(&primary.endpoint()).is_some());

    // Closing the primary's side drops its pooled connection
    let pooled = client.manager().pooled(&primary.endpoint()).unwrap();
    pooled.close().await.unwrap();
    primary.stop();
    drop(pooled);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reply = client
        .invoke(&target, "echo", &marshaler, &b"two"[..])
        .await
        .unwrap();
    assert_eq!(&reply[..], b"two");
    assert!(client.manager().pooled(&primary.endpoint()).is_none());
    assert!(client.manager().pooled(&backup.endpoint()).is_some());
}
