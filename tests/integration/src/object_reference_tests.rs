//! Object Reference Tests - Stringified References Against Live Servers
//!
//! These tests exercise the addressing layer end to end:
//! - `IOR:` strings and `corbaloc:` URLs resolved and invoked over TCP
//! - LOCATION_FORWARD from one server to another
//! - LocateRequest outcomes
//! - System exceptions surfaced to the caller

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::*;
use giop::{system_exception_id, DispatchError, IncomingRequest, ServantDispatcher, SystemException};
use iiop::{EndpointResolver, ObjectReference, OrbClient, OrbError, RawMarshaler};

/// Forwards every request and locate to `target`
struct Forwarder {
    target: ObjectReference,
}

#[async_trait]
impl ServantDispatcher for Forwarder {
    async fn dispatch(&self, request: IncomingRequest) -> Result<Bytes, DispatchError> {
        let mut writer = request.reply_writer();
        self.target
            .encode(&mut writer)
            .map_err(|_| DispatchError::System(SystemException::marshal()))?;
        Err(DispatchError::Forward(writer.into_bytes()))
    }

    async fn locate(&self, object_key: &[u8]) -> bool {
        object_key == ECHO_KEY
    }
}

/// Test: an IOR string built for a live server round-trips and is invocable
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stringified_ior_invocation() {
    init_logging();

    let server = start_server(TestServant).await;
    let ior = reference_to(&server.endpoint()).to_string();
    assert!(ior.starts_with("IOR:"));

    let target: ObjectReference = ior.parse().unwrap();
    assert_eq!(target.type_id(), ECHO_TYPE_ID);
    assert_eq!(
        EndpointResolver::new().resolve(&target).unwrap(),
        vec![server.endpoint()]
    );

    let client = OrbClient::new();
    let reply = client
        .invoke(&target, "echo", &RawMarshaler::new(), &b"via IOR"[..])
        .await
        .unwrap();
    assert_eq!(&reply[..], b"via IOR");
}

/// Test: corbaloc addresses become separate profiles; only the first is dialled
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_corbaloc_invocation() {
    init_logging();

    let server = start_server(TestServant).await;
    let dead = unreachable_endpoint().await;
    let url = format!(
        "corbaloc:iiop:1.2@{}:{},iiop:1.1@{}:{}/EchoPOA%2Fecho",
        dead.host, dead.port, server.addr.ip(), server.addr.port()
    );
    let target = ObjectReference::parse(&url).unwrap();
    assert_eq!(target.profiles().len(), 2);

    // Each corbaloc address is its own profile; the resolver uses the first
    let client = OrbClient::new();
    let err = client
        .invoke(&target, "echo", &RawMarshaler::new(), &b"x"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, OrbError::Giop(giop::GiopError::AllEndpointsUnreachable { .. })));

    let live = format!("corbaloc::{}:{}/EchoPOA%2Fecho", server.addr.ip(), server.addr.port());
    let reply = client
        .invoke(&ObjectReference::parse(&live).unwrap(), "echo", &RawMarshaler::new(), &b"x"[..])
        .await
        .unwrap();
    assert_eq!(&reply[..], b"x");
}

/// Test: requests to the forwarder end up at the real server
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_location_forward_between_servers() {
    init_logging();

    let real = start_server(TestServant).await;
    let forwarder = start_server(Forwarder {
        target: reference_to(&real.endpoint()),
    })
    .await;

    let client = OrbClient::new();
    let reply = client
        .invoke(
            &reference_to(&forwarder.endpoint()),
            "echo",
            &RawMarshaler::new(),
            &b"forwarded"[..],
        )
        .await
        .unwrap();
    assert_eq!(&reply[..], b"forwarded");
    assert_eq!(client.manager().stats().connections, 2);
    assert_eq!(real.server.stats().snapshot().requests_received, 1);
}

/// Test: LocateRequest answers for known and unknown keys
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_locate_request() {
    init_logging();

    let server = start_server(Forwarder {
        target: ObjectReference::nil(),
    })
    .await;
    let client = OrbClient::new();

    let here = reference_to(&server.endpoint());
    assert_eq!(client.locate(&here).await.unwrap(), here);

    let corbaloc = format!("corbaloc::{}:{}/missing", server.addr.ip(), server.addr.port());
    let err = client
        .locate(&ObjectReference::parse(&corbaloc).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, OrbError::ObjectNotExist));
}

/// Test: unknown operations come back as BAD_OPERATION
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_system_exception_surfaced() {
    init_logging();

    let server = start_server(TestServant).await;
    let client = OrbClient::new();
    let err = client
        .invoke(&reference_to(&server.endpoint()), "nope", &RawMarshaler::new(), &b""[..])
        .await
        .unwrap_err();
    match err {
        OrbError::SystemException(ex) => {
            assert_eq!(ex.repository_id, system_exception_id::BAD_OPERATION)
        }
        other => panic!("expected system exception, got {:?}", other),
    }

    // The connection survives an exception reply
    let reply = client
        .invoke(&reference_to(&server.endpoint()), "echo", &RawMarshaler::new(), &b"ok"[..])
        .await
        .unwrap();
    assert_eq!(&reply[..], b"ok");
}
