//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use prommux::config::GatewayConfig;
use prommux::discovery::manual::{self, ManualHandle};
use prommux::observability::{MetricsSink, RecordingSink};
use prommux::targets::{LabelSet, TargetGroup};
use prommux::{Gateway, GatewayError, HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Request head as seen by a mock backend.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request = read_head(&mut socket).await;
                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            204 => "204 No Content",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a mock backend that always answers `status` with `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (status, body.to_string()) }).await
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    RecordedRequest {
        method,
        path,
        headers,
    }
}

/// A gateway served on an ephemeral port and fed by hand.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub feed: ManualHandle,
    pub metrics: Arc<RecordingSink>,
    pub shutdown: Shutdown,
    pub consumer: JoinHandle<Result<(), GatewayError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Publish a batch and wait until it was applied.
    pub async fn publish(&self, groups: Vec<TargetGroup>) {
        let mut sub = self.gateway.readiness().subscribe(16);
        assert!(self.feed.publish(groups));
        let applied = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(value) = sub.recv().await {
                if value {
                    return;
                }
            }
        })
        .await;
        assert!(applied.is_ok(), "batch was not applied");
    }

    pub async fn stop(self) -> Result<(), GatewayError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.consumer)
            .await
            .expect("consumer stopped")
            .expect("consumer did not panic")
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let metrics = Arc::new(RecordingSink::new());
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    start_gateway_with(config, metrics, sink).await
}

pub async fn start_gateway_with(
    config: GatewayConfig,
    metrics: Arc<RecordingSink>,
    sink: Arc<dyn MetricsSink>,
) -> TestGateway {
    let (feed, discoverer) = manual::channel();
    let gateway = Arc::new(Gateway::new(config, Arc::new(discoverer), sink).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(Arc::clone(&gateway));
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    let consumer = {
        let gateway = Arc::clone(&gateway);
        let token = shutdown.subscribe();
        tokio::spawn(async move { gateway.run(token).await })
    };

    TestGateway {
        addr,
        gateway,
        feed,
        metrics,
        shutdown,
        consumer,
    }
}

/// A single-group batch with one target per label set.
pub fn batch(targets: Vec<LabelSet>) -> Vec<TargetGroup> {
    vec![TargetGroup {
        targets,
        labels: LabelSet::new(),
        source: "test".to_string(),
    }]
}

/// Labels of a target scraped at `address`, plus `extra`.
pub fn target(address: &str, extra: &[(&str, &str)]) -> LabelSet {
    let mut labels: LabelSet = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    labels.insert("__address__".to_string(), address.to_string());
    labels
}

pub async fn get(url: &str) -> (u16, String) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}
