//! End-to-end IIOP scenarios against an in-process server
//!
//! Starts an echo server on a loopback port, reaches it through each way of
//! naming an object, and reports one line per scenario. The exit status is
//! non-zero when any scenario fails.
//!
//! ```text
//! cargo run -p integration-tests
//! RUST_LOG=debug cargo run -p integration-tests
//! ```
//!
//! The test categories run separately:
//! ```text
//! cargo test -p integration-tests --test object_reference_tests
//! ```

mod common;

use common::*;
use futures::future::BoxFuture;
use futures::FutureExt;
use giop::{CallContext, ConnectionManagerConfig, Endpoint, GiopVersion};
use iiop::{ObjectReference, OrbClient, OrbError, RawMarshaler};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::info;

type Outcome = iiop::Result<()>;

struct Scenario {
    name: &'static str,
    run: fn(Endpoint) -> BoxFuture<'static, Outcome>,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "stringified IOR",
        run: |server| stringified_ior(server).boxed(),
    },
    Scenario {
        name: "corbaloc URL in IIOP 1.0",
        run: |server| corbaloc_url(server).boxed(),
    },
    Scenario {
        name: "iiop:// URL",
        run: |server| iiop_url(server).boxed(),
    },
    Scenario {
        name: "configured version cap",
        run: |server| version_cap(server).boxed(),
    },
    Scenario {
        name: "locate",
        run: |server| locate(server).boxed(),
    },
    Scenario {
        name: "alternate address failover",
        run: |server| failover(server).boxed(),
    },
    Scenario {
        name: "call context",
        run: |server| call_context(server).boxed(),
    },
];

/// Invoke `echo` on `target` and check the payload comes back
async fn echo_through(client: &OrbClient, target: &ObjectReference) -> Outcome {
    let payload = b"ping";
    let reply = client
        .invoke(target, "echo", &RawMarshaler::new(), &payload[..])
        .await?;
    expect(&reply[..] == payload, "echo returned a different payload")
}

fn expect(condition: bool, what: &str) -> Outcome {
    if condition {
        Ok(())
    } else {
        Err(OrbError::InvalidObjectReference(what.to_string()))
    }
}

fn spoken_version(client: &OrbClient, server: &Endpoint) -> Option<GiopVersion> {
    client.manager().pooled(server).map(|c| c.spoken_version())
}

async fn stringified_ior(server: Endpoint) -> Outcome {
    let ior = reference_to(&server).to_ior_string()?;
    echo_through(&OrbClient::new(), &ObjectReference::parse(&ior)?).await
}

async fn corbaloc_url(server: Endpoint) -> Outcome {
    let client = OrbClient::new();
    let url = format!("corbaloc::{}:{}/EchoPOA%2Fecho", server.host, server.port);
    echo_through(&client, &ObjectReference::parse(&url)?).await?;
    expect(
        spoken_version(&client, &server) == Some(GiopVersion::V1_0),
        "corbaloc default version not used",
    )
}

async fn iiop_url(server: Endpoint) -> Outcome {
    let client = OrbClient::new();
    let url = format!("iiop://{}:{}/EchoPOA%2Fecho", server.host, server.port);
    echo_through(&client, &ObjectReference::parse(&url)?).await?;
    expect(
        spoken_version(&client, &server) == Some(GiopVersion::V1_2),
        "iiop:// did not default to 1.2",
    )
}

async fn version_cap(server: Endpoint) -> Outcome {
    let client = OrbClient::builder()
        .config(ConnectionManagerConfig {
            giop_version: GiopVersion::V1_1,
            ..Default::default()
        })
        .build();
    echo_through(&client, &reference_to(&server)).await?;
    expect(
        spoken_version(&client, &server) == Some(GiopVersion::V1_1),
        "client exceeded its configured version",
    )
}

async fn locate(server: Endpoint) -> Outcome {
    let target = reference_to(&server);
    let located = OrbClient::new().locate(&target).await?;
    expect(located == target, "object not reported here")
}

async fn failover(server: Endpoint) -> Outcome {
    let dead = unreachable_endpoint().await;
    echo_through(&OrbClient::new(), &reference_with_alternates(&dead, &[server])).await
}

async fn call_context(server: Endpoint) -> Outcome {
    let reply = CallContext::new()
        .with("key", "value")
        .scope(OrbClient::new().invoke(
            &reference_to(&server),
            "context",
            &RawMarshaler::new(),
            &b""[..],
        ))
        .await?;
    expect(&reply[..] == b"value", "call context lost")
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = start_server(TestServant).await;
    info!("Echo server on {}", server.endpoint());

    let mut failed = 0;
    for scenario in SCENARIOS {
        let start = Instant::now();
        let outcome =
            tokio::time::timeout(Duration::from_secs(10), (scenario.run)(server.endpoint())).await;
        let elapsed = start.elapsed();
        match outcome {
            Ok(Ok(())) => println!("PASS  {:<30} {:?}", scenario.name, elapsed),
            Ok(Err(e)) => {
                failed += 1;
                println!("FAIL  {:<30} {}", scenario.name, e);
            }
            Err(_) => {
                failed += 1;
                println!("FAIL  {:<30} timed out", scenario.name);
            }
        }
    }

    println!("{} of {} scenarios passed", SCENARIOS.len() - failed, SCENARIOS.len());
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
