//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use backend_balancer::config::LoadBalancerConfig;
use backend_balancer::health::{Probe, ProbeOutcome};
use backend_balancer::observability::MemoryAuditSink;
use backend_balancer::{HealthStatus, LoadBalancer, Server, ServerId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a mock backend that answers every request with `status` and `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (status, body.to_string()) }).await
}

/// Start a mock backend whose response is computed per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
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
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            204 => "204 No Content",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
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

/// A loopback address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Probe whose per-server result is set by the test. Unknown servers pass.
#[derive(Default)]
pub struct ScriptedProbe {
    results: Mutex<HashMap<String, bool>>,
}

impl ScriptedProbe {
    pub fn set(&self, id: &str, ok: bool) {
        self.results.lock().unwrap().insert(id.to_string(), ok);
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, server: &Server) -> ProbeOutcome {
        let ok = *self
            .results
            .lock()
            .unwrap()
            .get(server.id.as_str())
            .unwrap_or(&true);
        if ok {
            ProbeOutcome::success(Duration::from_millis(1))
        } else {
            ProbeOutcome::failure(Duration::from_millis(1))
        }
    }
}

pub fn set_status(lb: &LoadBalancer, id: &str, status: HealthStatus) {
    let id = ServerId::from(id);
    let mut health = lb.server(&id).unwrap().health;
    health.status = status;
    lb.registry().update_health(&id, health).unwrap();
}

/// Balancer holding one Healthy server per id, with a recording audit sink.
pub fn healthy_balancer(
    config: LoadBalancerConfig,
    ids: &[&str],
) -> (LoadBalancer, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let lb = LoadBalancer::builder(config)
        .with_probe(Arc::new(ScriptedProbe::default()))
        .with_audit(audit.clone())
        .build()
        .unwrap();
    for (i, id) in ids.iter().enumerate() {
        lb.add_server(Server::new(*id, "127.0.0.1", 9000 + i as u16))
            .unwrap();
        set_status(&lb, id, HealthStatus::Healthy);
    }
    (lb, audit)
}
