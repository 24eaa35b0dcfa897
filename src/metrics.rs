//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const BATCH_HISTORY: usize = 1000;

/// Metrics registry for the sync server
#[derive(Debug)]
pub struct Metrics {
    // Sessions
    pub sessions_active: AtomicU64,
    pub sessions_loaded: AtomicU64,
    pub sessions_evicted: AtomicU64,
    pub sessions_unloaded: AtomicU64,

    // Requests
    pub sync_requests: AtomicU64,
    pub action_requests: AtomicU64,
    pub actions_rejected: AtomicU64,
    pub request_errors: AtomicU64,

    // Engine
    pub ticks_processed: AtomicU64,
    pub template_errors: AtomicU64,
    pub auto_pauses: AtomicU64,

    // Deltas
    pub deltas_sent: AtomicU64,
    pub deltas_empty: AtomicU64,
    pub delta_sections: AtomicU64,

    // Batch timing (microseconds)
    pub batch_time_us: AtomicU64,
    pub batch_time_p95_us: AtomicU64,
    pub batch_time_p99_us: AtomicU64,
    pub batch_time_max_us: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    start_time: Instant,

    // Rolling batch times for percentile calculation
    batch_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            sessions_loaded: AtomicU64::new(0),
            sessions_evicted: AtomicU64::new(0),
            sessions_unloaded: AtomicU64::new(0),
            sync_requests: AtomicU64::new(0),
            action_requests: AtomicU64::new(0),
            actions_rejected: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            ticks_processed: AtomicU64::new(0),
            template_errors: AtomicU64::new(0),
            auto_pauses: AtomicU64::new(0),
            deltas_sent: AtomicU64::new(0),
            deltas_empty: AtomicU64::new(0),
            delta_sections: AtomicU64::new(0),
            batch_time_us: AtomicU64::new(0),
            batch_time_p95_us: AtomicU64::new(0),
            batch_time_p99_us: AtomicU64::new(0),
            batch_time_max_us: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
            batch_history: RwLock::new(VecDeque::with_capacity(BATCH_HISTORY)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one delta; `sections == 0` means nothing observable changed
    pub fn record_delta(&self, sections: usize) {
        if sections == 0 {
            Self::incr(&self.deltas_empty);
        } else {
            Self::incr(&self.deltas_sent);
            self.delta_sections.fetch_add(sections as u64, Ordering::Relaxed);
        }
    }

    /// Record the processing time of one locked batch and update percentiles
    pub fn record_batch_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.batch_time_us.store(us, Ordering::Relaxed);

        let mut history = self.batch_history.write();
        history.push_back(us);
        while history.len() > BATCH_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.batch_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.batch_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.batch_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("waystone_sessions_active", "Sessions currently loaded", "gauge",
            self.sessions_active.load(Ordering::Relaxed));
        metric!("waystone_sessions_loaded_total", "Sessions hydrated from saves", "counter",
            self.sessions_loaded.load(Ordering::Relaxed));
        metric!("waystone_sessions_evicted_total", "Sessions evicted for inactivity", "counter",
            self.sessions_evicted.load(Ordering::Relaxed));
        metric!("waystone_sessions_unloaded_total", "Sessions closed by the client", "counter",
            self.sessions_unloaded.load(Ordering::Relaxed));

        metric!("waystone_sync_requests_total", "Periodic sync requests", "counter",
            self.sync_requests.load(Ordering::Relaxed));
        metric!("waystone_action_requests_total", "Player action requests", "counter",
            self.action_requests.load(Ordering::Relaxed));
        metric!("waystone_actions_rejected_total", "Actions rejected by validation", "counter",
            self.actions_rejected.load(Ordering::Relaxed));
        metric!("waystone_request_errors_total", "Requests failed before producing a response", "counter",
            self.request_errors.load(Ordering::Relaxed));

        metric!("waystone_ticks_processed_total", "In-game minutes simulated", "counter",
            self.ticks_processed.load(Ordering::Relaxed));
        metric!("waystone_template_errors_total", "Effects skipped for a missing template", "counter",
            self.template_errors.load(Ordering::Relaxed));
        metric!("waystone_auto_pauses_total", "Sessions auto-paused for inactivity", "counter",
            self.auto_pauses.load(Ordering::Relaxed));

        metric!("waystone_deltas_sent_total", "Responses carrying a delta", "counter",
            self.deltas_sent.load(Ordering::Relaxed));
        metric!("waystone_deltas_empty_total", "Responses with nothing changed", "counter",
            self.deltas_empty.load(Ordering::Relaxed));
        metric!("waystone_delta_sections_total", "Delta sections sent", "counter",
            self.delta_sections.load(Ordering::Relaxed));

        metric!("waystone_batch_time_microseconds", "Last batch processing time", "gauge",
            self.batch_time_us.load(Ordering::Relaxed));
        metric!("waystone_batch_time_p95_microseconds", "95th percentile batch time", "gauge",
            self.batch_time_p95_us.load(Ordering::Relaxed));
        metric!("waystone_batch_time_p99_microseconds", "99th percentile batch time", "gauge",
            self.batch_time_p99_us.load(Ordering::Relaxed));
        metric!("waystone_batch_time_max_microseconds", "Maximum batch time", "gauge",
            self.batch_time_max_us.load(Ordering::Relaxed));

        metric!("waystone_connections_active", "Open client connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("waystone_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("waystone_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("waystone_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "sessions": {
                "active": self.sessions_active.load(Ordering::Relaxed),
                "loaded": self.sessions_loaded.load(Ordering::Relaxed),
                "evicted": self.sessions_evicted.load(Ordering::Relaxed),
                "unloaded": self.sessions_unloaded.load(Ordering::Relaxed),
            },
            "requests": {
                "sync": self.sync_requests.load(Ordering::Relaxed),
                "action": self.action_requests.load(Ordering::Relaxed),
                "rejected": self.actions_rejected.load(Ordering::Relaxed),
                "errors": self.request_errors.load(Ordering::Relaxed),
            },
            "engine": {
                "ticks": self.ticks_processed.load(Ordering::Relaxed),
                "template_errors": self.template_errors.load(Ordering::Relaxed),
                "auto_pauses": self.auto_pauses.load(Ordering::Relaxed),
            },
            "deltas": {
                "sent": self.deltas_sent.load(Ordering::Relaxed),
                "empty": self.deltas_empty.load(Ordering::Relaxed),
                "sections": self.delta_sections.load(Ordering::Relaxed),
            },
            "performance": {
                "batch_time_us": self.batch_time_us.load(Ordering::Relaxed),
                "batch_time_p95_us": self.batch_time_p95_us.load(Ordering::Relaxed),
                "batch_time_p99_us": self.batch_time_p99_us.load(Ordering::Relaxed),
                "batch_time_max_us": self.batch_time_max_us.load(Ordering::Relaxed),
            },
            "network": {
                "connections": self.connections_active.load(Ordering::Relaxed),
                "bytes_sent": self.bytes_sent.load(Ordering::Relaxed),
                "bytes_received": self.bytes_received.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Answer one request line
fn route(request: &str, metrics: &Metrics) -> String {
    let path = request
        .strip_prefix("GET ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("");
    match path {
        "/metrics/json" => http_response("200 OK", "application/json", &metrics.to_json()),
        "/metrics" => http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus()),
        "/health" => http_response("200 OK", "text/plain", "OK"),
        _ => http_response("404 Not Found", "text/plain", ""),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Metrics accept failed: {}", e);
                continue;
            }
        };
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let n = match socket.read(&mut buffer).await {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                    return;
                }
            };

            let response = route(&String::from_utf8_lossy(&buffer[..n]), &metrics);
            if let Err(e) = socket.write_all(response.as_bytes()).await {
                debug!("Failed to write metrics response to {}: {}", peer, e);
            }
        });
    }
}
