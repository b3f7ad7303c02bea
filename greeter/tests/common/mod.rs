//! Stub Greeter server shared by the integration tests

#![allow(dead_code)]

use greeter_client::grpc::{self, Client, DialTarget, Mode};
use greeter_client::resolver::ResolverRegistry;
use greeter_client_grpc::prelude::*;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// A call as seen by the stub
#[derive(Debug, Clone)]
pub struct ReceivedCall {
    pub name: String,
    pub at: Instant,
    pub grpc_timeout: Option<String>,
}

/// Greeter answering `Hello, <name>` until `fail_after` calls succeeded
#[derive(Debug, Default)]
pub struct StubGreeter {
    pub fail_after: Option<usize>,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<ReceivedCall>>,
}

impl StubGreeter {
    pub fn failing_after(successes: usize) -> Self {
        StubGreeter {
            fail_after: Some(successes),
            ..Default::default()
        }
    }

    pub fn stalling(delay: Duration) -> Self {
        StubGreeter {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[tonic::async_trait]
impl Greeter for StubGreeter {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let grpc_timeout = request
            .metadata()
            .get("grpc-timeout")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let name = request.into_inner().name;

        let succeeded = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ReceivedCall {
                name: name.clone(),
                at: Instant::now(),
                grpc_timeout,
            });
            calls.len() - 1
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.fail_after {
            Some(limit) if succeeded >= limit => Err(Status::unavailable("stub is done")),
            _ => Ok(Response::new(HelloReply {
                message: format!("Hello, {name}"),
            })),
        }
    }
}

/// Serve `stub` on a free local port
pub async fn start_stub(stub: Arc<StubGreeter>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(GreeterServer::from_arc(stub))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

/// Client dialed directly at `addr`, the way `MODE` != `k8s` does it
pub fn direct_client(addr: SocketAddr) -> Client {
    let target = DialTarget::new(&addr.to_string(), Mode::Direct);
    let channel = grpc::dial(&target, &ResolverRegistry::new()).unwrap();
    Client::new(channel)
}
