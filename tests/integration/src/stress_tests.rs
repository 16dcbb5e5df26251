//! Stress Tests - Concurrent Invocations At Scale
//!
//! These tests push many requests through pooled connections:
//! - Many tasks sharing one client and one connection
//! - Replies completing out of order
//! - Many independent clients against one server
//! - Sequential rapid fire on a single connection

mod common;

use common::*;
use futures::future::join_all;
use iiop::{OrbClient, RawMarshaler};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Test: concurrent tasks multiplex over one pooled connection
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_connection_concurrency() {
    init_logging();

    const NUM_TASKS: usize = 20;
    const REQUESTS_PER_TASK: usize = 50;
    const PAYLOAD_SIZES: &[usize] = &[0, 1, 16, 255, 1024, 4096, 70_000];

    let server = start_server(TestServant).await;
    let client = Arc::new(OrbClient::new());
    let target = reference_to(&server.endpoint());
    let stats = Arc::new(ConcurrentStats::new());

    let tasks = (0..NUM_TASKS).map(|task_id| {
        let client = Arc::clone(&client);
        let target = target.clone();
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            let mut gen = TestDataGenerator::new(task_id as u64 * 7919);
            for req in 0..REQUESTS_PER_TASK {
                let payload = gen.random_bytes(PAYLOAD_SIZES[req % PAYLOAD_SIZES.len()]);
                let start = Instant::now();
                match client
                    .invoke(&target, "echo", &RawMarshaler::new(), &payload[..])
                    .await
                {
                    Ok(reply) if reply == payload => stats.record_success(start.elapsed()),
                    Ok(_) => {
                        eprintln!("Payload mismatch in task {}", task_id);
                        stats.record_failure();
                    }
                    Err(e) => {
                        eprintln!("Request failed: {}", e);
                        stats.record_failure();
                    }
                }
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    println!("\n=== Shared Connection Results ===");
    println!("Successful: {}", stats.success_count());
    println!("Failed: {}", stats.failure_count());
    println!("Avg latency: {:?}", stats.avg_latency());

    assert_eq!(stats.failure_count(), 0);
    assert_eq!(stats.success_count(), (NUM_TASKS * REQUESTS_PER_TASK) as u64);
    assert_eq!(client.manager().stats().connections, 1);
    assert_eq!(client.manager().stats().pending_replies, 0);
}

/// Test: a fast request is not held up behind a slow one
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_out_of_order_completion() {
    init_logging();

    let server = start_server(TestServant).await;
    let client = Arc::new(OrbClient::new());
    let target = reference_to(&server.endpoint());

    // Warm the pool so both calls share a connection
    client
        .invoke(&target, "echo", &RawMarshaler::new(), &b""[..])
        .await
        .unwrap();

    let slow = {
        let client = Arc::clone(&client);
        let target = target.clone();
        tokio::spawn(async move {
            client
                .invoke(&target, "sleep", &RawMarshaler::new(), &u32_payload(500)[..])
                .await
                .map(|_| Instant::now())
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast_done = client
        .invoke(&target, "sleep", &RawMarshaler::new(), &u32_payload(10)[..])
        .await
        .map(|_| Instant::now())
        .unwrap();
    let slow_done = slow.await.unwrap().unwrap();

    assert!(fast_done < slow_done);
    assert_eq!(client.manager().stats().connections, 1);
}

/// Test: many independent clients against one server
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_clients() {
    init_logging();

    const NUM_CLIENTS: usize = 25;
    const REQUESTS_PER_CLIENT: usize = 20;

    let server = start_server(TestServant).await;
    let target = reference_to(&server.endpoint());

    let clients = (0..NUM_CLIENTS).map(|client_id| {
        let target = target.clone();
        tokio::spawn(async move {
            let client = OrbClient::new();
            for req in 0..REQUESTS_PER_CLIENT {
                let payload = format!("client_{}_request_{}", client_id, req);
                let reply = client
                    .invoke(&target, "echo", &RawMarshaler::new(), payload.as_bytes())
                    .await
                    .unwrap();
                assert_eq!(&reply[..], payload.as_bytes());
            }
            client.shutdown().await;
        })
    });
    for result in join_all(clients).await {
        result.unwrap();
    }

    let snapshot = server.server.stats().snapshot();
    assert_eq!(snapshot.connections_accepted, NUM_CLIENTS as u64);
    assert_eq!(
        snapshot.requests_received,
        (NUM_CLIENTS * REQUESTS_PER_CLIENT) as u64
    );
}

/// Test: sequential rapid fire on one connection
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_fire_sequential() {
    init_logging();

    const NUM_REQUESTS: usize = 1000;

    let server = start_server(TestServant).await;
    let client = OrbClient::new();
    let target = reference_to(&server.endpoint());
    let stats = ConcurrentStats::new();

    let start = Instant::now();
    for i in 0..NUM_REQUESTS {
        let payload = format!("request_{:05}", i);
        let req_start = Instant::now();
        match client
            .invoke(&target, "echo", &RawMarshaler::new(), payload.as_bytes())
            .await
        {
            Ok(reply) if &reply[..] == payload.as_bytes() => {
                stats.record_success(req_start.elapsed())
            }
            _ => stats.record_failure(),
        }
    }
    let total = start.elapsed();

    println!("\n=== Rapid Fire Test Results ===");
    println!("Total requests: {}", NUM_REQUESTS);
    println!(
        "Throughput: {:.2} req/sec",
        NUM_REQUESTS as f64 / total.as_secs_f64()
    );
    println!("Avg latency: {:?}", stats.avg_latency());

    assert_eq!(stats.failure_count(), 0);
}
