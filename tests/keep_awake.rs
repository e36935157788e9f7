use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

use voice_relay::domain::{PingResult, SupervisorState};
use voice_relay::services::{HealthServer, HealthState, LivenessClient, Metrics};
use voice_relay::{SelfPinger, Shutdown, ShutdownSignal};

const INTERVAL: Duration = Duration::from_millis(50);

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn pinger_for(addr: SocketAddr) -> SelfPinger {
    let client = LivenessClient::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    SelfPinger::new(client, INTERVAL, Duration::from_secs(60))
}

async fn next_result(rx: &mut broadcast::Receiver<PingResult>) -> PingResult {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no ping result within 5s")
        .unwrap()
}

async fn collect(rx: &mut broadcast::Receiver<PingResult>, count: usize) -> Vec<PingResult> {
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        results.push(next_result(rx).await);
    }
    results
}

/// Consecutive results are one interval apart; a backing-off loop would
/// double the gap every round.
fn assert_fixed_cadence(results: &[PingResult]) {
    let gaps: Vec<Duration> = results
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).to_std().unwrap())
        .collect();
    for gap in &gaps {
        assert!(*gap >= INTERVAL - Duration::from_millis(10), "gaps {gaps:?}");
        assert!(*gap < INTERVAL * 5, "gaps {gaps:?}");
    }
}

#[tokio::test]
async fn pings_the_real_liveness_endpoint() {
    let (_state_tx, state_rx) = watch::channel(SupervisorState::Connected);
    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthState::new(state_rx, Arc::clone(&metrics)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HealthServer::new(health, addr);
    let server_token = shutdown.token();
    let server_task = tokio::spawn(async move { server.serve(listener, server_token).await });

    let pinger = pinger_for(addr).with_metrics(Arc::clone(&metrics));
    let mut results = pinger.subscribe();
    assert!(pinger.start());

    let pings = collect(&mut results, 6).await;
    for result in &pings {
        assert!(result.success, "ping failed: {:?}", result.detail);
        assert_eq!(result.status_code, Some(200));
        assert!(result.detail.as_deref().unwrap().contains("alive"));
    }
    assert_fixed_cadence(&pings);

    pinger.stop().await;
    assert!(metrics.pings_succeeded.load(Ordering::Relaxed) >= 6);

    shutdown.request_shutdown(ShutdownSignal::Requested);
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn failures_keep_the_fixed_interval() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().route(
        "/ping",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }),
    );
    let addr = serve(router).await;

    let pinger = pinger_for(addr);
    let mut results = pinger.subscribe();
    pinger.start();

    let failures = collect(&mut results, 6).await;
    for result in &failures {
        assert!(!result.success);
        assert_eq!(result.status_code, Some(500));
    }
    assert_fixed_cadence(&failures);
    pinger.stop().await;

    assert!(hits.load(Ordering::SeqCst) >= 6);
    assert!(!pinger.is_running());
}

#[tokio::test]
async fn wrong_body_shape_is_a_failure() {
    let router = Router::new().route(
        "/ping",
        get(|| async { Json(json!({ "status": "sleeping", "timestamp": 1 })) }),
    );
    let addr = serve(router).await;

    let pinger = pinger_for(addr);
    let mut results = pinger.subscribe();
    pinger.start();

    let result = next_result(&mut results).await;
    assert!(!result.success);
    assert_eq!(result.status_code, Some(200));
    pinger.stop().await;
}

#[tokio::test]
async fn refused_connection_is_a_failure() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let pinger = pinger_for(addr);
    let mut results = pinger.subscribe();
    pinger.start();

    let result = next_result(&mut results).await;
    assert!(!result.success);
    assert_eq!(result.status_code, None);
    pinger.stop().await;
}

#[tokio::test]
async fn double_start_runs_one_loop() {
    let router = Router::new().route(
        "/ping",
        get(|| async { Json(json!({ "status": "alive", "timestamp": 1 })) }),
    );
    let addr = serve(router).await;

    let pinger = pinger_for(addr);
    assert!(pinger.start());
    assert!(!pinger.start());
    assert_eq!(pinger.active_loops(), 1);

    pinger.stop().await;
    assert_eq!(pinger.active_loops(), 0);
}

#[tokio::test]
async fn health_check_reports_status() {
    let router = Router::new().route(
        "/health",
        get(|| async {
            Json(json!({ "status": "healthy", "service": "discord-bot", "timestamp": 1 }))
        }),
    );
    let addr = serve(router).await;

    let client = LivenessClient::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    assert!(client.health_check().await);

    let broken = Router::new().route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let broken_addr = serve(broken).await;
    let client =
        LivenessClient::new(&format!("http://{}", broken_addr), Duration::from_secs(2)).unwrap();
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn unbuildable_request_waits_the_recovery_delay() {
    // reqwest refuses to build requests for non-http schemes
    let client = LivenessClient::new("ftp://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let metrics = Arc::new(Metrics::new());
    let pinger = SelfPinger::new(client, INTERVAL, Duration::from_secs(60))
        .with_metrics(Arc::clone(&metrics));
    let mut results = pinger.subscribe();
    pinger.start();

    let first = next_result(&mut results).await;
    assert!(!first.success);
    assert_eq!(first.status_code, None);
    assert!(first.detail.is_some());

    // Many intervals pass without a second attempt
    let second = tokio::time::timeout(INTERVAL * 12, results.recv()).await;
    assert!(second.is_err(), "loop did not pause: {second:?}");
    assert_eq!(metrics.pings_failed.load(Ordering::Relaxed), 1);

    // Stop still interrupts the recovery pause
    let started = std::time::Instant::now();
    pinger.stop().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pinger.active_loops(), 0);
}
