//! Prometheus metrics for the probe service.
//!
//! Counters mirror the command loop statistics; gauges hold the latest
//! reading and the client link state.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use serde_json::json;
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Command Loop Metrics
// ============================================================================

/// Total command loop polls
pub static POLLS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("rtdprobe_polls_total", "Total command loop polls").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Read commands processed
pub static COMMANDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("rtdprobe_commands_total", "Read commands processed").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Input bytes that were not a command
pub static IGNORED_BYTES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rtdprobe_ignored_bytes_total",
        "Input bytes ignored because they were not a command",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Temperature lines written
pub static READINGS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rtdprobe_readings_reported_total",
        "Temperature values reported to the client",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Fault notices written
pub static FAULTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rtdprobe_faults_reported_total",
        "Sensor faults reported and cleared",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Response lines that could not be written
pub static WRITE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "rtdprobe_write_failures_total",
        "Response lines that failed to reach the transport",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Sensor State Metrics
// ============================================================================

/// Last reported temperature in Celsius
pub static TEMPERATURE_C: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "rtdprobe_temperature_celsius",
        "Last reported RTD temperature in Celsius",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Fault register of the last read (0 when clean)
pub static FAULT_CODE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "rtdprobe_last_fault_code",
        "Fault register bits of the last read (0 = clean)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Client link status (1 = connected, 0 = disconnected)
pub static CLIENT_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "rtdprobe_client_connected",
        "Probe client connection status (1=connected, 0=disconnected)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Status, content type and body of one HTTP reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }
}

/// Ready once the command loop has polled at least once.
pub fn is_ready() -> bool {
    POLLS_TOTAL.get() > 0
}

/// Answers one request path. Query strings are ignored.
pub fn route(url: &str) -> Reply {
    let path = url.split('?').next().unwrap_or(url);
    match path {
        "/metrics" => {
            let mut body = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut body) {
                tracing::warn!(error = %e, "Failed to encode metrics");
                return Reply::text(500, "Internal Server Error");
            }
            Reply {
                status: 200,
                content_type: "text/plain; version=0.0.4",
                body,
            }
        }
        "/health" => Reply::text(200, "OK"),
        "/ready" if is_ready() => Reply::text(200, "Ready"),
        "/ready" => Reply::text(503, "Not Ready"),
        "/status" => {
            let connected = CLIENT_CONNECTED.get() > 0.0;
            let status = json!({
                "ready": is_ready(),
                "polls": POLLS_TOTAL.get(),
                "readings": READINGS_TOTAL.get(),
                "faults": FAULTS_TOTAL.get(),
                "temperature_c": (READINGS_TOTAL.get() > 0).then(|| TEMPERATURE_C.get()),
                "last_fault_code": FAULT_CODE.get() as u8,
                "client_connected": connected,
            });
            Reply {
                status: 200,
                content_type: "application/json",
                body: status.to_string().into_bytes(),
            }
        }
        _ => Reply::text(404, "Not Found"),
    }
}

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(addr = %bind_addr, error = %e, "Failed to start metrics server");
                return;
            }
        };
        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let reply = route(request.url());
            let mut response = Response::from_data(reply.body).with_status_code(reply.status);
            if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes())
            {
                response = response.with_header(header);
            }
            if let Err(e) = request.respond(response) {
                tracing::debug!(error = %e, "Metrics client went away");
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = POLLS_TOTAL.get();
    let _ = COMMANDS_TOTAL.get();
    let _ = IGNORED_BYTES_TOTAL.get();
    let _ = READINGS_TOTAL.get();
    let _ = FAULTS_TOTAL.get();
    let _ = WRITE_FAILURES_TOTAL.get();
    let _ = TEMPERATURE_C.get();
    let _ = FAULT_CODE.get();
    let _ = CLIENT_CONNECTED.get();
}
