// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : parkit_rust — parking lot ticketing & fare engine in Rust
Module  : config.rs
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
use clap::Parser;
use dotenvy::dotenv;
use std::env;
use tracing::warn;

use crate::domain::VehicleCategory;
use crate::fare::{FareCalculator, BIKE_RATE_PER_HOUR, CAR_RATE_PER_HOUR};

/// Override dari command line (opsional, menimpa ENV)
#[derive(Parser, Debug, Default)]
#[command(name = "parkit_rust", about = "Parking lot ticketing console")]
pub struct Cli {
    /// SQLite file; omit for an in-memory ledger
    #[arg(long)]
    pub database: Option<String>,
    #[arg(long)]
    pub car_spots: Option<u32>,
    #[arg(long)]
    pub bike_spots: Option<u32>,
    /// JSONL event file
    #[arg(long)]
    pub record_file: Option<String>,
    /// 0 disables the metrics endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

#[derive(Clone, Debug)]
pub struct Args {
    // storage
    pub database_path: Option<String>,
    pub car_spots: u32,
    pub bike_spots: u32,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,
    pub log_level: String,
}

/// Hourly rate per category. `None` = category tidak dilayani.
#[derive(Clone, Debug)]
pub struct Rates {
    pub car_per_hour: Option<f64>,
    pub bike_per_hour: Option<f64>,
}

impl Rates {
    pub fn calculator(&self) -> FareCalculator {
        FareCalculator::new(
            [
                (VehicleCategory::Car, self.car_per_hour),
                (VehicleCategory::Bike, self.bike_per_hour),
            ]
            .into_iter()
            .filter_map(|(c, r)| r.map(|r| (c, r))),
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Upper bound per category; spot ids must fit in u32 after summing.
pub const MAX_SPOTS: u32 = 10_000;

/// Rate <= 0, non-finite or unparsable disables the category.
fn parse_rate(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|r| r.is_finite() && *r > 0.0)
}

fn rate_from_env(key: &str, default: f64) -> Option<f64> {
    match env::var(key) {
        Err(_) => Some(default),
        Ok(s) => parse_rate(&s),
    }
}

fn capped_spots(key: &str, n: u32) -> u32 {
    if n > MAX_SPOTS {
        warn!(key, n, max = MAX_SPOTS, "spot count capped");
        return MAX_SPOTS;
    }
    n
}

pub fn load(cli: Cli) -> (Args, Rates) {
    // Pastikan .env dibaca (DATABASE_PATH, RECORD_FILE, dll)
    let _ = dotenv();

    // ===== Storage =====
    let database_path = env::var("DATABASE_PATH").ok().filter(|s| !s.trim().is_empty());
    let car_spots = env_parse("CAR_SPOTS").unwrap_or(3);
    let bike_spots = env_parse("BIKE_SPOTS").unwrap_or(2);

    // ===== Files / metrics / log =====
    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.trim().is_empty());
    let metrics_port = env_parse("METRICS_PORT").unwrap_or(0);
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let args = Args {
        database_path: cli.database.or(database_path),
        car_spots: capped_spots("CAR_SPOTS", cli.car_spots.unwrap_or(car_spots)),
        bike_spots: capped_spots("BIKE_SPOTS", cli.bike_spots.unwrap_or(bike_spots)),
        record_file: cli.record_file.or(record_file),
        metrics_port: cli.metrics_port.unwrap_or(metrics_port),
        log_level,
    };

    // ===== Rates =====
    let rates = Rates {
        car_per_hour: rate_from_env("CAR_RATE_PER_HOUR", CAR_RATE_PER_HOUR),
        bike_per_hour: rate_from_env("BIKE_RATE_PER_HOUR", BIKE_RATE_PER_HOUR),
    };
    (args, rates)
}
