//! Integration Tests

mod common;

use common::{direct_client, start_stub, StubGreeter};
use greeter_client::grpc::{self, DialTarget, GreeterError, LoopSettings, Mode};
use greeter_client::resolver::{
    KubernetesTarget, ResolverBuilder, ResolverError, ResolverHandle, ResolverRegistry, Target,
};
use greeter_client::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

fn fast_settings(name: &str) -> LoopSettings {
    LoopSettings {
        name: name.to_owned(),
        timeout: Duration::from_secs(1),
        interval: Duration::from_millis(10),
    }
}

/// Pretends to be the Kubernetes resolver, serving fixed addresses
#[derive(Debug)]
struct FixedEndpoints(Vec<SocketAddr>);

impl ResolverBuilder for FixedEndpoints {
    fn scheme(&self) -> &'static str {
        "kubernetes"
    }

    fn build(
        &self,
        target: &Target,
        addresses: watch::Sender<Vec<SocketAddr>>,
    ) -> Result<ResolverHandle, ResolverError> {
        KubernetesTarget::try_from(target)?;
        let list = self.0.clone();
        Ok(ResolverHandle::new(tokio::spawn(async move {
            addresses.send_replace(list);
            addresses.closed().await;
        })))
    }
}

#[tokio::test]
async fn test_say_hello_world() {
    let stub = Arc::new(StubGreeter::default());
    let addr = start_stub(stub.clone()).await;
    let mut client = direct_client(addr);

    let message = grpc::say_hello(&mut client, &fast_settings("world"))
        .await
        .unwrap();
    assert_eq!(message, "Hello, world");
    assert_eq!(stub.calls().len(), 1);
}

#[tokio::test]
async fn test_error_terminates_loop() {
    let stub = Arc::new(StubGreeter::failing_after(0));
    let addr = start_stub(stub.clone()).await;
    let mut client = direct_client(addr);

    let result = grpc::run(&mut client, &fast_settings("world"), std::future::pending::<()>()).await;

    match result {
        Err(GreeterError::Rpc { source }) => assert_eq!(source.code(), tonic::Code::Unavailable),
        other => panic!("expected an rpc error, got {:?}", other),
    }

    // no further attempt after the failure
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stub.calls().len(), 1);
}

#[tokio::test]
async fn test_name_fixed_across_iterations() {
    let stub = Arc::new(StubGreeter::failing_after(5));
    let addr = start_stub(stub.clone()).await;
    let mut client = direct_client(addr);

    let result = grpc::run(&mut client, &fast_settings("gopher"), std::future::pending::<()>()).await;
    assert!(result.is_err());

    let calls = stub.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls.iter().all(|call| call.name == "gopher"));
}

#[tokio::test]
async fn test_default_interval_between_requests() {
    let stub = Arc::new(StubGreeter::failing_after(1));
    let addr = start_stub(stub.clone()).await;
    let mut client = direct_client(addr);

    let settings = LoopSettings::new("world", &Config::new());
    let result = grpc::run(&mut client, &settings, std::future::pending::<()>()).await;
    assert!(result.is_err());

    let calls = stub.calls();
    assert_eq!(calls.len(), 2);
    let pause = calls[1].at.duration_since(calls[0].at);
    assert!(pause >= Duration::from_secs(2), "pause was {:?}", pause);
    assert!(pause < Duration::from_secs(3), "pause was {:?}", pause);
}

#[tokio::test]
async fn test_default_request_deadline() {
    let stub = Arc::new(StubGreeter::stalling(Duration::from_secs(5)));
    let addr = start_stub(stub.clone()).await;
    let mut client = direct_client(addr);

    let settings = LoopSettings::new("world", &Config::new());
    let start = Instant::now();
    let result = grpc::run(&mut client, &settings, std::future::pending::<()>()).await;
    let elapsed = start.elapsed();

    // whichever side notices first, the call ends with the deadline
    match result {
        Err(GreeterError::DeadlineExceeded { timeout }) => {
            assert_eq!(timeout, Duration::from_secs(1))
        }
        Err(GreeterError::Rpc { source }) => assert!(matches!(
            source.code(),
            tonic::Code::Cancelled | tonic::Code::DeadlineExceeded
        )),
        Ok(()) => panic!("loop must not end successfully"),
    }
    assert!(elapsed >= Duration::from_millis(900), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);

    let calls = stub.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].grpc_timeout.is_some());
}

#[tokio::test]
async fn test_shutdown_ends_loop_successfully() {
    let stub = Arc::new(StubGreeter::default());
    let addr = start_stub(stub.clone()).await;
    let mut client = direct_client(addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = shutdown_tx.send(());
    });

    let result = grpc::run(
        &mut client,
        &fast_settings("world"),
        greeter_client::shutdown_signal("greeter", Some(shutdown_rx)),
    )
    .await;
    assert!(result.is_ok());
    assert!(!stub.calls().is_empty());
}

#[tokio::test]
async fn test_round_robin_over_discovered_endpoints() {
    let first = Arc::new(StubGreeter::default());
    let second = Arc::new(StubGreeter::default());
    let addresses = vec![
        start_stub(first.clone()).await,
        start_stub(second.clone()).await,
    ];

    let mut registry = ResolverRegistry::new();
    registry.register(FixedEndpoints(addresses));

    let target = DialTarget::new("greeter:50051", Mode::Kubernetes);
    let channel = grpc::dial(&target, &registry).unwrap();
    let mut client = grpc::Client::new(channel);

    let settings = fast_settings("world");
    for _ in 0..4 {
        let message = grpc::say_hello(&mut client, &settings).await.unwrap();
        assert_eq!(message, "Hello, world");
    }

    assert_eq!(first.calls().len(), 2);
    assert_eq!(second.calls().len(), 2);
}
