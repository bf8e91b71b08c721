// ===============================
// src/fare.rs
// ===============================
//
// Tarif parkir:
// - <= 30 menit gratis (grace period), kategori & loyalty apa pun.
// - > 30 menit: SELURUH durasi ditagih (tidak dikurangi 30 menit)
//   = menit * (tarif_per_jam / 60) * (0.95 jika pelanggan loyal).
//
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Ticket, VehicleCategory};

pub const FREE_MINUTES: f64 = 30.0;
pub const LOYALTY_FACTOR: f64 = 0.95;

pub const CAR_RATE_PER_HOUR: f64 = 1.5;
pub const BIKE_RATE_PER_HOUR: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum FareError {
    #[error("invalid parking interval: {0}")]
    InvalidInterval(String),
    #[error("no hourly rate configured for {0}")]
    UnsupportedCategory(VehicleCategory),
}

#[derive(Debug, Clone)]
pub struct FareCalculator {
    hourly: HashMap<VehicleCategory, f64>,
}

impl Default for FareCalculator {
    fn default() -> Self {
        Self::new([
            (VehicleCategory::Car, CAR_RATE_PER_HOUR),
            (VehicleCategory::Bike, BIKE_RATE_PER_HOUR),
        ])
    }
}

impl FareCalculator {
    pub fn new(rates: impl IntoIterator<Item = (VehicleCategory, f64)>) -> Self {
        Self { hourly: rates.into_iter().collect() }
    }

    pub fn hourly_rate(&self, category: VehicleCategory) -> Result<f64, FareError> {
        self.hourly.get(&category).copied().ok_or(FareError::UnsupportedCategory(category))
    }

    pub fn compute_fare(
        &self,
        category: VehicleCategory,
        duration_minutes: f64,
        is_loyalty_customer: bool,
    ) -> Result<f64, FareError> {
        // NaN juga ditolak
        if !(duration_minutes >= 0.0) {
            return Err(FareError::InvalidInterval(format!("duration {duration_minutes} min")));
        }
        let rate_per_minute = self.hourly_rate(category)? / 60.0;
        if duration_minutes <= FREE_MINUTES {
            return Ok(0.0);
        }
        let factor = if is_loyalty_customer { LOYALTY_FACTOR } else { 1.0 };
        Ok(duration_minutes * rate_per_minute * factor)
    }

    /// Fare of a ticket that already carries its out-time.
    pub fn fare_for_ticket(&self, ticket: &Ticket) -> Result<f64, FareError> {
        let out = ticket
            .out_time
            .ok_or_else(|| FareError::InvalidInterval("out time missing".to_string()))?;
        let minutes = elapsed_minutes(ticket.in_time, out)?;
        self.compute_fare(ticket.spot.category, minutes, ticket.is_loyalty_customer)
    }
}

/// Fractional minutes between two instants; `out` before `inn` is rejected.
pub fn elapsed_minutes(inn: DateTime<Utc>, out: DateTime<Utc>) -> Result<f64, FareError> {
    if out < inn {
        return Err(FareError::InvalidInterval(format!("out time {out} is before in time {inn}")));
    }
    Ok((out - inn).num_milliseconds() as f64 / 60_000.0)
}
