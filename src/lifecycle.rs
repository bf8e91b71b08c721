// ===============================
// src/lifecycle.rs (arrival / departure)
// ===============================
//
// Alur:
//   arrival   : cek tiket terbuka -> alokasi spot -> hitung loyalty
//               -> spot jadi unavailable -> simpan tiket (price 0, out_time kosong)
//   departure : ambil tiket terbuka -> out_time = now -> hitung tarif
//               -> diskon tambahan kalau histori > 1 -> update tiket -> spot available
//
// Setiap langkah tulis berdiri sendiri (tidak ada rollback). Kalau simpan tiket
// gagal setelah spot ditandai unavailable, spot tetap unavailable; kalau
// pelepasan spot gagal setelah tiket ditutup, tiket tetap tertutup.
//
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::allocator::SpotAllocator;
use crate::domain::{SpotId, Ticket, VehicleCategory};
use crate::fare::{FareCalculator, FareError, LOYALTY_FACTOR};
use crate::ledger::{LedgerError, TicketLedger};
use crate::metrics::{ARRIVALS, DEPARTURES, FAILURES, REVENUE};

pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Test clock: a shared instant that only moves when told to.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct FixedClock(std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>);

#[cfg(test)]
impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self { Self(std::sync::Arc::new(std::sync::Mutex::new(at))) }

    pub fn advance(&self, by: chrono::Duration) {
        let mut t = self.0.lock().unwrap();
        *t += by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> { *self.0.lock().unwrap() }
}

/// Which ledger call a persistence failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStep {
    Query,
    MarkSpotUnavailable,
    SaveTicket,
    UpdateTicket,
    ReleaseSpot,
}

impl fmt::Display for PersistStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PersistStep::Query => "query",
            PersistStep::MarkSpotUnavailable => "mark spot unavailable",
            PersistStep::SaveTicket => "save ticket",
            PersistStep::UpdateTicket => "update ticket",
            PersistStep::ReleaseSpot => "release spot",
        })
    }
}

#[derive(Debug, Error)]
pub enum ParkingError {
    #[error("no free {category} spot, parking slots might be full")]
    LotFull { category: VehicleCategory },
    #[error("no open ticket for vehicle {registration}")]
    NoOpenTicket { registration: String },
    #[error("vehicle {registration} is already parked in spot {spot}")]
    AlreadyParked { registration: String, spot: SpotId },
    #[error("invalid parking interval: {0}")]
    InvalidInterval(String),
    #[error("unsupported vehicle category: {0}")]
    UnsupportedCategory(VehicleCategory),
    #[error("persistence failed at {step}{}", .source.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    Persistence { step: PersistStep, source: Option<LedgerError> },
}

impl ParkingError {
    /// Short label for metrics / logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ParkingError::LotFull { .. } => "lot_full",
            ParkingError::NoOpenTicket { .. } => "no_open_ticket",
            ParkingError::AlreadyParked { .. } => "already_parked",
            ParkingError::InvalidInterval(_) => "invalid_interval",
            ParkingError::UnsupportedCategory(_) => "unsupported_category",
            ParkingError::Persistence { .. } => "persistence",
        }
    }
}

impl From<FareError> for ParkingError {
    fn from(e: FareError) -> Self {
        match e {
            FareError::InvalidInterval(s) => ParkingError::InvalidInterval(s),
            FareError::UnsupportedCategory(c) => ParkingError::UnsupportedCategory(c),
        }
    }
}

fn query_failed(e: LedgerError) -> ParkingError {
    ParkingError::Persistence { step: PersistStep::Query, source: Some(e) }
}

/// `Ok(false)` from the ledger counts as a failed write.
fn written(step: PersistStep, r: Result<bool, LedgerError>) -> Result<(), ParkingError> {
    match r {
        Ok(true) => Ok(()),
        Ok(false) => Err(ParkingError::Persistence { step, source: None }),
        Err(e) => Err(ParkingError::Persistence { step, source: Some(e) }),
    }
}

pub struct ParkingLifecycle<L: TicketLedger> {
    ledger: L,
    fares: FareCalculator,
    clock: Box<dyn Clock>,
}

impl<L: TicketLedger> ParkingLifecycle<L> {
    pub fn new(ledger: L, fares: FareCalculator, clock: Box<dyn Clock>) -> Self {
        Self { ledger, fares, clock }
    }

    pub fn ledger(&self) -> &L { &self.ledger }

    pub fn handle_arrival(&mut self, reg: &str, category: VehicleCategory) -> Result<Ticket, ParkingError> {
        let res = self.arrive(reg, category);
        match &res {
            Ok(t) => {
                ARRIVALS.with_label_values(&[category.as_str()]).inc();
                info!(reg = %reg, spot = t.spot.id, %category, loyalty = t.is_loyalty_customer, ticket = ?t.id, "vehicle parked");
            }
            Err(e) => self.note_failure("arrival", reg, e),
        }
        res
    }

    pub fn handle_departure(&mut self, reg: &str) -> Result<Ticket, ParkingError> {
        let res = self.depart(reg);
        match &res {
            Ok(t) => {
                DEPARTURES.with_label_values(&[t.spot.category.as_str()]).inc();
                REVENUE.inc_by(t.price);
                info!(reg = %reg, spot = t.spot.id, price = t.price, ticket = ?t.id, "vehicle left");
            }
            Err(e) => self.note_failure("departure", reg, e),
        }
        res
    }

    fn arrive(&mut self, reg: &str, category: VehicleCategory) -> Result<Ticket, ParkingError> {
        if let Some(open) = self.ledger.open_ticket(reg).map_err(query_failed)? {
            return Err(ParkingError::AlreadyParked { registration: reg.to_string(), spot: open.spot.id });
        }

        let mut spot = SpotAllocator::new(&self.ledger)
            .find_available(category)
            .map_err(query_failed)?
            .ok_or(ParkingError::LotFull { category })?;

        let history = self.ledger.ticket_count(reg).map_err(query_failed)?;
        let is_loyalty_customer = history >= 1;
        debug!(reg = %reg, history, is_loyalty_customer, "loyalty at arrival");

        written(PersistStep::MarkSpotUnavailable, self.ledger.update_spot_availability(spot.id, false))?;
        spot.available = false;

        let mut ticket = Ticket::open(spot, reg, self.clock.now(), is_loyalty_customer);
        // spot stays unavailable if this fails
        let id = self
            .ledger
            .save_ticket(&ticket)
            .map_err(|e| ParkingError::Persistence { step: PersistStep::SaveTicket, source: Some(e) })?;
        ticket.id = Some(id);
        Ok(ticket)
    }

    fn depart(&mut self, reg: &str) -> Result<Ticket, ParkingError> {
        let mut ticket = self
            .ledger
            .open_ticket(reg)
            .map_err(query_failed)?
            .ok_or_else(|| ParkingError::NoOpenTicket { registration: reg.to_string() })?;

        ticket.out_time = Some(self.clock.now());
        let mut price = self.fares.fare_for_ticket(&ticket)?;

        // second, independent loyalty check on top of the arrival-time flag
        let history = self.ledger.ticket_count(reg).map_err(query_failed)?;
        if history > 1 {
            price *= LOYALTY_FACTOR;
        }
        debug!(reg = %reg, history, price, "fare computed");
        ticket.price = price;

        written(PersistStep::UpdateTicket, self.ledger.update_ticket(&ticket))?;
        // ticket stays closed if this fails
        written(PersistStep::ReleaseSpot, self.ledger.update_spot_availability(ticket.spot.id, true))?;
        Ok(ticket)
    }

    fn note_failure(&self, op: &str, reg: &str, e: &ParkingError) {
        FAILURES.with_label_values(&[e.kind()]).inc();
        match e {
            ParkingError::NoOpenTicket { .. } | ParkingError::LotFull { .. } | ParkingError::AlreadyParked { .. } => {
                warn!(op, reg = %reg, error = %e, "request not served")
            }
            _ => error!(op, reg = %reg, error = %e, "request failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParkingSpot;
    use chrono::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        Spot(SpotId, bool),
        Save(Ticket),
        Update(Ticket),
    }

    /// Ledger double: canned answers, records every write, fails on demand.
    #[derive(Default)]
    struct ScriptedLedger {
        open: Option<Ticket>,
        count: u32,
        free_spot: Option<SpotId>,
        fail_spot_update: bool,
        fail_save: bool,
        fail_update: bool,
        broken_reads: bool,
        writes: Vec<Write>,
    }

    impl TicketLedger for ScriptedLedger {
        fn open_ticket(&self, _reg: &str) -> Result<Option<Ticket>, LedgerError> {
            if self.broken_reads {
                return Err(LedgerError::Corrupt("connection refused".into()));
            }
            Ok(self.open.clone())
        }
        fn ticket_count(&self, _reg: &str) -> Result<u32, LedgerError> { Ok(self.count) }
        fn ticket(&self, _id: i64) -> Result<Option<Ticket>, LedgerError> { Ok(None) }
        fn save_ticket(&mut self, t: &Ticket) -> Result<i64, LedgerError> {
            self.writes.push(Write::Save(t.clone()));
            if self.fail_save {
                return Err(LedgerError::Corrupt("disk full".into()));
            }
            Ok(7)
        }
        fn update_ticket(&mut self, t: &Ticket) -> Result<bool, LedgerError> {
            self.writes.push(Write::Update(t.clone()));
            Ok(!self.fail_update)
        }
        fn find_available_spot(&self, _c: VehicleCategory) -> Result<Option<SpotId>, LedgerError> { Ok(self.free_spot) }
        fn update_spot_availability(&mut self, spot: SpotId, available: bool) -> Result<bool, LedgerError> {
            self.writes.push(Write::Spot(spot, available));
            Ok(!self.fail_spot_update)
        }
        fn occupancy(&self, _c: VehicleCategory) -> Result<(u32, u32), LedgerError> { Ok((0, 0)) }
    }

    fn lifecycle(ledger: ScriptedLedger, now: DateTime<Utc>) -> ParkingLifecycle<ScriptedLedger> {
        ParkingLifecycle::new(ledger, FareCalculator::default(), Box::new(FixedClock::new(now)))
    }

    fn parked_since(minutes: i64, now: DateTime<Utc>) -> Ticket {
        let mut t = Ticket::open(
            ParkingSpot { id: 1, category: VehicleCategory::Car, available: false },
            "ABCDEF",
            now - Duration::minutes(minutes),
            false,
        );
        t.id = Some(3);
        t
    }

    #[test]
    fn first_visit_car_arrival() {
        let now = Utc::now();
        let mut lc = lifecycle(ScriptedLedger { free_spot: Some(1), ..Default::default() }, now);

        let t = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap();
        assert!(!t.is_loyalty_customer);
        assert_eq!(t.price, 0.0);
        assert!(t.out_time.is_none());
        assert_eq!(t.in_time, now);
        assert_eq!(t.id, Some(7));
        assert_eq!(t.spot.id, 1);

        let w = &lc.ledger().writes;
        assert_eq!(w.len(), 2);
        assert_eq!(w[0], Write::Spot(1, false));
        match &w[1] {
            Write::Save(saved) => {
                assert_eq!(saved.vehicle_registration, "ABCDEF");
                assert_eq!(saved.price, 0.0);
                assert!(saved.out_time.is_none());
                assert!(!saved.is_loyalty_customer);
            }
            other => panic!("expected save, got {other:?}"),
        }
    }

    #[test]
    fn returning_vehicle_is_loyal_at_arrival() {
        let mut lc = lifecycle(ScriptedLedger { free_spot: Some(2), count: 1, ..Default::default() }, Utc::now());
        assert!(lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap().is_loyalty_customer);
    }

    #[test]
    fn full_lot_writes_nothing() {
        let mut lc = lifecycle(ScriptedLedger::default(), Utc::now());
        let err = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap_err();
        assert!(matches!(err, ParkingError::LotFull { category: VehicleCategory::Car }));
        assert!(lc.ledger().writes.is_empty());
    }

    #[test]
    fn vehicle_with_open_ticket_cannot_enter_again() {
        let now = Utc::now();
        let ledger = ScriptedLedger { free_spot: Some(2), open: Some(parked_since(10, now)), ..Default::default() };
        let mut lc = lifecycle(ledger, now);
        let err = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap_err();
        assert!(matches!(err, ParkingError::AlreadyParked { spot: 1, .. }));
        assert!(lc.ledger().writes.is_empty());
    }

    #[test]
    fn spot_update_failure_stops_arrival() {
        let ledger = ScriptedLedger { free_spot: Some(1), fail_spot_update: true, ..Default::default() };
        let mut lc = lifecycle(ledger, Utc::now());
        let err = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap_err();
        assert!(matches!(err, ParkingError::Persistence { step: PersistStep::MarkSpotUnavailable, .. }));
        assert_eq!(lc.ledger().writes, vec![Write::Spot(1, false)]);
    }

    #[test]
    fn save_failure_leaves_spot_taken() {
        let ledger = ScriptedLedger { free_spot: Some(1), fail_save: true, ..Default::default() };
        let mut lc = lifecycle(ledger, Utc::now());
        let err = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap_err();
        assert!(matches!(err, ParkingError::Persistence { step: PersistStep::SaveTicket, source: Some(_) }));
        // no compensating write
        let w = &lc.ledger().writes;
        assert_eq!(w.len(), 2);
        assert_eq!(w[0], Write::Spot(1, false));
    }

    #[test]
    fn recurring_user_departure_after_an_hour() {
        let now = Utc::now();
        let ledger = ScriptedLedger { open: Some(parked_since(60, now)), count: 5, ..Default::default() };
        let mut lc = lifecycle(ledger, now);

        let t = lc.handle_departure("ABCDEF").unwrap();
        let expected = FareCalculator::default().compute_fare(VehicleCategory::Car, 60.0, false).unwrap() * 0.95;
        assert!(t.price > 0.0);
        assert!((t.price - expected).abs() < 0.01);
        assert_eq!(t.out_time, Some(now));

        let w = &lc.ledger().writes;
        assert_eq!(w.len(), 2);
        match &w[0] {
            Write::Update(u) => {
                assert!(u.out_time.is_some());
                assert!(u.price > 0.0);
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(w[1], Write::Spot(1, true));
    }

    #[test]
    fn stored_flag_and_recount_both_discount() {
        let now = Utc::now();
        let mut open = parked_since(60, now);
        open.is_loyalty_customer = true;
        let mut lc = lifecycle(ScriptedLedger { open: Some(open), count: 2, ..Default::default() }, now);
        let t = lc.handle_departure("ABCDEF").unwrap();
        assert!((t.price - 1.5 * 0.95 * 0.95).abs() < 0.01);
    }

    #[test]
    fn single_ticket_history_gets_no_recount_discount() {
        let now = Utc::now();
        let mut lc = lifecycle(ScriptedLedger { open: Some(parked_since(60, now)), count: 1, ..Default::default() }, now);
        let t = lc.handle_departure("ABCDEF").unwrap();
        assert!((t.price - 1.5).abs() < 0.01);
    }

    #[test]
    fn short_stay_is_free() {
        let now = Utc::now();
        let mut lc = lifecycle(ScriptedLedger { open: Some(parked_since(20, now)), count: 3, ..Default::default() }, now);
        assert_eq!(lc.handle_departure("ABCDEF").unwrap().price, 0.0);
    }

    #[test]
    fn departure_without_ticket_is_a_no_op() {
        let mut lc = lifecycle(ScriptedLedger::default(), Utc::now());
        let err = lc.handle_departure("ABCDEF").unwrap_err();
        assert!(matches!(err, ParkingError::NoOpenTicket { ref registration } if registration == "ABCDEF"));
        assert!(lc.ledger().writes.is_empty());
    }

    #[test]
    fn failed_ticket_update_keeps_spot_taken() {
        let now = Utc::now();
        let ledger = ScriptedLedger { open: Some(parked_since(60, now)), fail_update: true, ..Default::default() };
        let mut lc = lifecycle(ledger, now);
        let err = lc.handle_departure("ABCDEF").unwrap_err();
        assert!(matches!(err, ParkingError::Persistence { step: PersistStep::UpdateTicket, source: None }));
        assert!(!lc.ledger().writes.iter().any(|w| matches!(w, Write::Spot(..))));
    }

    #[test]
    fn failed_spot_release_is_reported_after_close() {
        let now = Utc::now();
        let ledger = ScriptedLedger { open: Some(parked_since(60, now)), fail_spot_update: true, ..Default::default() };
        let mut lc = lifecycle(ledger, now);
        let err = lc.handle_departure("ABCDEF").unwrap_err();
        assert!(matches!(err, ParkingError::Persistence { step: PersistStep::ReleaseSpot, .. }));
        assert!(matches!(lc.ledger().writes[0], Write::Update(_)));
    }

    #[test]
    fn clock_behind_in_time_is_invalid_interval() {
        let now = Utc::now();
        let mut open = parked_since(0, now);
        open.in_time = now + Duration::minutes(5);
        let mut lc = lifecycle(ScriptedLedger { open: Some(open), ..Default::default() }, now);
        assert!(matches!(lc.handle_departure("ABCDEF"), Err(ParkingError::InvalidInterval(_))));
        assert!(lc.ledger().writes.is_empty());
    }

    #[test]
    fn category_without_rate_is_unsupported() {
        let now = Utc::now();
        let ledger = ScriptedLedger { open: Some(parked_since(60, now)), ..Default::default() };
        let fares = FareCalculator::new([(VehicleCategory::Bike, 1.0)]);
        let mut lc = ParkingLifecycle::new(ledger, fares, Box::new(FixedClock::new(now)));
        assert!(matches!(
            lc.handle_departure("ABCDEF"),
            Err(ParkingError::UnsupportedCategory(VehicleCategory::Car))
        ));
    }

    #[test]
    fn ledger_read_errors_surface_typed() {
        let mut lc = lifecycle(ScriptedLedger { broken_reads: true, ..Default::default() }, Utc::now());
        assert!(matches!(
            lc.handle_departure("ABCDEF"),
            Err(ParkingError::Persistence { step: PersistStep::Query, source: Some(_) })
        ));
    }
}
