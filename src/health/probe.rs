//! Health probes.
//!
//! # Responsibilities
//! - Define what a probe reports (success, latency, optional gauges)
//! - Probe servers over HTTP: `GET {path}`, any 2xx is success
//!
//! Deadlines are enforced by the caller, not by the probe.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;

use crate::load_balancer::Server;

/// Largest health response body inspected for gauges.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Optional load gauges reported by the server itself.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct ProbeGauges {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub error_rate: Option<f64>,
}

impl ProbeGauges {
    fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.error_rate.is_none()
    }
}

/// Result of probing one server once.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub response_time: Duration,
    pub gauges: Option<ProbeGauges>,
}

impl ProbeOutcome {
    pub fn success(response_time: Duration) -> Self {
        Self {
            success: true,
            response_time,
            gauges: None,
        }
    }

    pub fn failure(response_time: Duration) -> Self {
        Self {
            success: false,
            response_time,
            gauges: None,
        }
    }

    pub fn with_gauges(mut self, gauges: ProbeGauges) -> Self {
        self.gauges = Some(gauges);
        self
    }
}

/// Checks whether a server can take traffic.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, server: &Server) -> ProbeOutcome;
}

/// HTTP health probe.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
    path: String,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            path: path.into(),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, server: &Server) -> ProbeOutcome {
        let started = Instant::now();

        let url = match server.health_url(&self.path) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(server = %server.id, error = %e, "Invalid health check URL");
                return ProbeOutcome::failure(started.elapsed());
            }
        };

        let request = match Request::builder()
            .method("GET")
            .uri(url.as_str())
            .header("user-agent", "backend-balancer-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(server = %server.id, error = %e, "Failed to build health check request");
                return ProbeOutcome::failure(started.elapsed());
            }
        };

        match self.client.request(request).await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    tracing::warn!(server = %server.id, status = %status, "Health check failed: non-success status");
                    return ProbeOutcome::failure(started.elapsed());
                }
                let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
                    .await
                    .ok();
                let outcome = ProbeOutcome::success(started.elapsed());
                match body.as_deref().and_then(parse_gauges) {
                    Some(gauges) => outcome.with_gauges(gauges),
                    None => outcome,
                }
            }
            Err(e) => {
                tracing::warn!(server = %server.id, error = %e, "Health check failed: connection error");
                ProbeOutcome::failure(started.elapsed())
            }
        }
    }
}

/// Gauges from a JSON health body, if it carries any.
pub fn parse_gauges(body: &[u8]) -> Option<ProbeGauges> {
    serde_json::from_slice::<ProbeGauges>(body)
        .ok()
        .filter(|g| !g.is_empty())
}
