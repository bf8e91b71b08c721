// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Counter, Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info, warn};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static ARRIVALS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("arrivals_total", "vehicles parked"), &["category"]).unwrap()
});

pub static DEPARTURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("departures_total", "vehicles checked out"), &["category"]).unwrap()
});

pub static FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("parking_failures_total", "arrival/departure requests not served (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static REVENUE: Lazy<Counter> =
    Lazy::new(|| Counter::new("revenue_total", "sum of fares charged at departure").unwrap());

pub static SPOTS_OCCUPIED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("spots_occupied", "occupied spots per category"), &["category"]).unwrap()
});

pub static SPOTS_TOTAL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("spots_total", "provisioned spots per category"), &["category"]).unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(ARRIVALS.clone())),
        REGISTRY.register(Box::new(DEPARTURES.clone())),
        REGISTRY.register(Box::new(FAILURES.clone())),
        REGISTRY.register(Box::new(REVENUE.clone())),
        REGISTRY.register(Box::new(SPOTS_OCCUPIED.clone())),
        REGISTRY.register(Box::new(SPOTS_TOTAL.clone())),
    ] {
        if let Err(e) = m {
            warn!(?e, "metric registration failed");
        }
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server di OS thread sendiri (runtime Tokio tetap bersih)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed, metrics endpoint disabled");
                return;
            }
        };
        info!(%addr, "metrics listening on / and /metrics");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => warn!(?e, "metrics accept error"),
            }
        }
    });
}
