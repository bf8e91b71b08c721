// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleCategory { Car, Bike }

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 2] = [VehicleCategory::Car, VehicleCategory::Bike];

    /// Label dipakai untuk kolom DB dan label metrics
    pub fn as_str(&self) -> &'static str {
        match self { VehicleCategory::Car => "CAR", VehicleCategory::Bike => "BIKE" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CAR" => Some(VehicleCategory::Car),
            "BIKE" => Some(VehicleCategory::Bike),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

pub type SpotId = u32;
pub type TicketId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingSpot { pub id: SpotId, pub category: VehicleCategory, pub available: bool }

/// One parking session. `spot` is a snapshot taken at arrival, not a live link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Assigned by the ledger on save.
    pub id: Option<TicketId>,
    pub spot: ParkingSpot,
    pub vehicle_registration: String,
    pub price: f64,
    pub in_time: DateTime<Utc>,
    pub out_time: Option<DateTime<Utc>>,
    pub is_loyalty_customer: bool,
}

impl Ticket {
    pub fn open(spot: ParkingSpot, vehicle_registration: &str, in_time: DateTime<Utc>, is_loyalty_customer: bool) -> Self {
        Self {
            id: None,
            spot,
            vehicle_registration: vehicle_registration.to_string(),
            price: 0.0,
            in_time,
            out_time: None,
            is_loyalty_customer,
        }
    }

    pub fn is_open(&self) -> bool { self.out_time.is_none() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation { Arrival, Departure }

/// Result record handed to the presentation side after each completed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingRecord {
    pub operation: Operation,
    pub spot_id: SpotId,
    pub vehicle_registration: String,
    pub price: f64,
    pub in_time: DateTime<Utc>,
    pub out_time: Option<DateTime<Utc>>,
}

impl ParkingRecord {
    pub fn from_ticket(operation: Operation, t: &Ticket) -> Self {
        Self {
            operation,
            spot_id: t.spot.id,
            vehicle_registration: t.vehicle_registration.clone(),
            price: t.price,
            in_time: t.in_time,
            out_time: t.out_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Record(ParkingRecord), Note(String) }
