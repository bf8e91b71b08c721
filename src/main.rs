// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/parkit_rust

 # jalankan dengan SQLite + metrics
 DATABASE_PATH=./data/parking.db METRICS_PORT=9898 RECORD_FILE=./data/events.jsonl cargo run

 # okupansi & pendapatan
 curl -s localhost:9898/metrics | egrep '^(spots_occupied|revenue_total|arrivals_total)'
*/
/*
=============================================================================
Project : parkit_rust — parking lot ticketing & fare engine in Rust
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Allocates CAR/BIKE spots on arrival, opens and closes tickets in a
          SQLite (or in-memory) ledger, charges duration-based fares with a
          loyalty discount, exposes Prometheus metrics, and records JSONL
          events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod domain;
mod config;
mod metrics;
mod recorder;
mod fare;
mod ledger;
mod memory;
mod sqlite;           // ledger relasional (DATABASE_PATH)
mod allocator;
mod lifecycle;
mod input;
mod desk;             // menu console

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Rates;
use crate::desk::ParkingDesk;
use crate::domain::Event;
use crate::input::ConsoleInput;
use crate::ledger::TicketLedger;
use crate::lifecycle::{ParkingLifecycle, SystemClock};
use crate::memory::MemoryLedger;
use crate::sqlite::SqliteLedger;

/// Runs the console desk on the calling thread until shutdown.
fn run_desk<L: TicketLedger>(ledger: L, rates: &Rates, events: Option<mpsc::Sender<Event>>) {
    let lifecycle = ParkingLifecycle::new(ledger, rates.calculator(), Box::new(SystemClock));
    let stdin = std::io::stdin();
    let input = ConsoleInput::new(stdin.lock());
    let mut desk = ParkingDesk::new(lifecycle, input, std::io::stdout(), events);
    desk.run();
}

#[tokio::main]
async fn main() {
    // ---- Load config ----
    let (args, rates) = config::load(config::Cli::parse());

    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        database = ?args.database_path,
        car_spots = args.car_spots,
        bike_spots = args.bike_spots,
        car_rate = ?rates.car_per_hour,
        bike_rate = ?rates.bike_per_hour,
        record_file = ?args.record_file,
        metrics_port = args.metrics_port,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if args.metrics_port > 0 {
        metrics::serve_metrics(args.metrics_port);
    }

    // ---- Recorder (optional) ----
    let (rec_tx, recorder) = match args.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(1024);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    };

    // ---- Ledger + desk ----
    // Desk blocking (stdin + rusqlite) -> jalan di blocking pool
    let desk = {
        let args = args.clone();
        tokio::task::spawn_blocking(move || match &args.database_path {
            Some(path) => {
                let mut ledger = match SqliteLedger::open(path) {
                    Ok(l) => l,
                    Err(e) => {
                        error!(%path, error = %e, "cannot open database");
                        return;
                    }
                };
                if let Err(e) = ledger.provision(args.car_spots, args.bike_spots) {
                    error!(error = %e, "cannot provision parking spots");
                    return;
                }
                run_desk(ledger, &rates, rec_tx);
            }
            None => {
                info!("DATABASE_PATH not set, tickets kept in memory only");
                run_desk(MemoryLedger::with_spots(args.car_spots, args.bike_spots), &rates, rec_tx);
            }
        })
    };

    if let Err(e) = desk.await {
        error!(?e, "desk task panicked");
    }

    // rec_tx sudah di-drop bersama desk -> recorder flush & selesai
    if let Some(handle) = recorder {
        let _ = handle.await;
    }
    info!("shutdown complete");
}
