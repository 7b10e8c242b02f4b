//! HTTP probes against pod health endpoints.
//!
//! Each probe opens its own TCP connection and speaks HTTP/1.1 through
//! hyper. The whole exchange, body included, is bounded by one timeout.

use std::time::Duration;

use bytes::Bytes;
use healthgrid_state::{ProbeError, ProbeResult, Severity};
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use tracing::debug;

/// Readiness endpoint: 2xx means the pod is good to go.
pub const GTG_PATH: &str = "/__gtg";
/// Detailed health endpoint with per-check severities.
pub const HEALTH_PATH: &str = "/__health";

/// Issues GET requests to pod endpoints.
#[derive(Debug, Clone)]
pub struct HttpProber {
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `Ok(())` if `GET {path}` answers 2xx.
    pub async fn probe_ok(&self, address: &str, port: u16, path: &str) -> ProbeResult<()> {
        let target = format!("{address}:{port}{path}");
        let (status, _) = self.get(address, port, path).await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            debug!(%status, %target, "health probe non-2xx");
            Err(ProbeError::Status { target, status })
        }
    }

    /// Status and body of `GET {path}`.
    pub async fn get(&self, address: &str, port: u16, path: &str) -> ProbeResult<(u16, Bytes)> {
        let authority = format!("{address}:{port}");

        match tokio::time::timeout(self.timeout, request(&authority, path)).await {
            Ok(result) => result,
            Err(_) => {
                let target = format!("http://{authority}{path}");
                debug!(%target, "health probe timed out");
                Err(ProbeError::Timeout(target))
            }
        }
    }
}

/// GET `path` in origin-form; the authority travels in the `host` header.
async fn request(authority: &str, path: &str) -> ProbeResult<(u16, Bytes)> {
    let connect_err = |reason: String| ProbeError::Connect {
        address: authority.to_string(),
        reason,
    };

    let stream = tokio::net::TcpStream::connect(authority)
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", authority)
        .header("user-agent", "healthgrid/0.1")
        .body(Empty::<Bytes>::new())
        .map_err(|e| connect_err(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| connect_err(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| ProbeError::Payload(e.to_string()))?
        .to_bytes();

    Ok((status, body))
}

#[derive(Debug, Deserialize)]
struct HealthPayload {
    #[serde(default)]
    checks: Vec<PayloadCheck>,
}

#[derive(Debug, Deserialize)]
struct PayloadCheck {
    ok: bool,
    #[serde(default)]
    severity: Severity,
}

/// Reduce a `/__health` payload to `(worst failing severity, has_failure)`.
pub fn individual_severity(body: &[u8]) -> ProbeResult<(Severity, bool)> {
    let payload: HealthPayload =
        serde_json::from_slice(body).map_err(|e| ProbeError::Payload(e.to_string()))?;

    let worst = payload
        .checks
        .iter()
        .filter(|c| !c.ok)
        .map(|c| c.severity)
        .min();

    Ok(match worst {
        Some(severity) => (severity, true),
        None => (Severity::FLOOR, false),
    })
}
