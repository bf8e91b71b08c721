// ===============================
// src/sqlite.rs (relational ledger)
// ===============================
//
// Ledger di atas SQLite. Skema di schema.sql (di-embed saat compile).
// Setiap panggilan langsung ke DB, tanpa cache: DB adalah sumber kebenaran.
//
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use crate::domain::{ParkingSpot, SpotId, Ticket, TicketId, VehicleCategory};
use crate::ledger::{LedgerError, TicketLedger};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const TICKET_COLUMNS: &str =
    "id, parking_number, parking_type, vehicle_reg_number, price, in_time, out_time, loyalty";

pub struct SqliteLedger {
    conn: Connection,
}

/// Raw row before the category text is validated.
struct TicketRow {
    id: TicketId,
    spot_id: SpotId,
    spot_type: String,
    reg: String,
    price: f64,
    in_time: DateTime<Utc>,
    out_time: Option<DateTime<Utc>>,
    loyalty: bool,
}

impl TicketRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            spot_id: row.get(1)?,
            spot_type: row.get(2)?,
            reg: row.get(3)?,
            price: row.get(4)?,
            in_time: row.get(5)?,
            out_time: row.get(6)?,
            loyalty: row.get(7)?,
        })
    }

    fn into_ticket(self) -> Result<Ticket, LedgerError> {
        let category = VehicleCategory::parse(&self.spot_type)
            .ok_or_else(|| LedgerError::Corrupt(format!("ticket {}: parking type {:?}", self.id, self.spot_type)))?;
        Ok(Ticket {
            id: Some(self.id),
            // snapshot; an open ticket's spot is by definition occupied
            spot: ParkingSpot { id: self.spot_id, category, available: false },
            vehicle_registration: self.reg,
            price: self.price,
            in_time: self.in_time,
            out_time: self.out_time,
            is_loyalty_customer: self.loyalty,
        })
    }
}

impl SqliteLedger {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path = %path.display(), "sqlite ledger opened");
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Seeds the spot inventory when the table is empty. Returns the number of spots inserted.
    pub fn provision(&mut self, car: u32, bike: u32) -> Result<u32, LedgerError> {
        let existing: u32 = self.conn.query_row("SELECT COUNT(*) FROM parking", [], |r| r.get(0))?;
        if existing > 0 {
            debug!(existing, "parking inventory already present, skip provisioning");
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO parking (parking_number, type, available) VALUES (?1, ?2, 1)")?;
            for id in 1..=car {
                stmt.execute(params![id, VehicleCategory::Car.as_str()])?;
            }
            for id in (car + 1)..=car.saturating_add(bike) {
                stmt.execute(params![id, VehicleCategory::Bike.as_str()])?;
            }
        }
        tx.commit()?;
        info!(car, bike, "parking inventory provisioned");
        Ok(car.saturating_add(bike))
    }

    #[cfg(test)]
    pub fn spot(&self, id: SpotId) -> Result<Option<ParkingSpot>, LedgerError> {
        let row = self
            .conn
            .query_row(
                "SELECT parking_number, type, available FROM parking WHERE parking_number = ?1",
                params![id],
                |r| Ok((r.get::<_, SpotId>(0)?, r.get::<_, String>(1)?, r.get::<_, bool>(2)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((id, ty, available)) => {
                let category = VehicleCategory::parse(&ty)
                    .ok_or_else(|| LedgerError::Corrupt(format!("spot {id}: type {ty:?}")))?;
                Ok(Some(ParkingSpot { id, category, available }))
            }
        }
    }
}

impl TicketLedger for SqliteLedger {
    fn open_ticket(&self, reg: &str) -> Result<Option<Ticket>, LedgerError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM ticket
             WHERE vehicle_reg_number = ?1 AND out_time IS NULL
             ORDER BY in_time DESC LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![reg], TicketRow::read)
            .optional()?
            .map(TicketRow::into_ticket)
            .transpose()
    }

    fn ticket_count(&self, reg: &str) -> Result<u32, LedgerError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM ticket WHERE vehicle_reg_number = ?1",
            params![reg],
            |r| r.get(0),
        )?)
    }

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, LedgerError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id], TicketRow::read)
            .optional()?
            .map(TicketRow::into_ticket)
            .transpose()
    }

    fn save_ticket(&mut self, t: &Ticket) -> Result<TicketId, LedgerError> {
        self.conn.execute(
            "INSERT INTO ticket (parking_number, parking_type, vehicle_reg_number, price, in_time, out_time, loyalty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                t.spot.id,
                t.spot.category.as_str(),
                t.vehicle_registration,
                t.price,
                t.in_time,
                t.out_time,
                t.is_loyalty_customer,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_ticket(&mut self, t: &Ticket) -> Result<bool, LedgerError> {
        let Some(id) = t.id else { return Ok(false) };
        let n = self.conn.execute(
            "UPDATE ticket SET price = ?1, out_time = ?2 WHERE id = ?3 AND out_time IS NULL",
            params![t.price, t.out_time, id],
        )?;
        debug!(ticket = id, rows = n, "update ticket");
        Ok(n == 1)
    }

    fn find_available_spot(&self, category: VehicleCategory) -> Result<Option<SpotId>, LedgerError> {
        Ok(self
            .conn
            .query_row(
                "SELECT MIN(parking_number) FROM parking WHERE available = 1 AND type = ?1",
                params![category.as_str()],
                |r| r.get::<_, Option<SpotId>>(0),
            )?)
    }

    fn update_spot_availability(&mut self, spot: SpotId, available: bool) -> Result<bool, LedgerError> {
        let n = self.conn.execute(
            "UPDATE parking SET available = ?1 WHERE parking_number = ?2",
            params![available, spot],
        )?;
        Ok(n == 1)
    }

    fn occupancy(&self, category: VehicleCategory) -> Result<(u32, u32), LedgerError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN available = 0 THEN 1 ELSE 0 END), 0)
             FROM parking WHERE type = ?1",
            params![category.as_str()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::fare::FareCalculator;
    use crate::lifecycle::{FixedClock, ParkingError, ParkingLifecycle};

    fn temp_ledger() -> (SqliteLedger, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut ledger = SqliteLedger::open(dir.path().join("parking.db")).expect("failed to open ledger");
        ledger.provision(3, 2).expect("provision");
        (ledger, dir)
    }

    #[test]
    fn provisioning_runs_once() {
        let (mut ledger, _dir) = temp_ledger();
        assert_eq!(ledger.provision(3, 2).unwrap(), 0);
        assert_eq!(ledger.occupancy(VehicleCategory::Car).unwrap(), (3, 0));
        assert_eq!(ledger.occupancy(VehicleCategory::Bike).unwrap(), (2, 0));
        assert_eq!(ledger.spot(4).unwrap().map(|s| s.category), Some(VehicleCategory::Bike));
    }

    #[test]
    fn next_available_slot_is_lowest_id() {
        let (mut ledger, _dir) = temp_ledger();
        assert_eq!(ledger.find_available_spot(VehicleCategory::Car).unwrap(), Some(1));
        assert!(ledger.update_spot_availability(1, false).unwrap());
        assert_eq!(ledger.find_available_spot(VehicleCategory::Car).unwrap(), Some(2));
        assert_eq!(ledger.find_available_spot(VehicleCategory::Bike).unwrap(), Some(4));
        assert_eq!(ledger.occupancy(VehicleCategory::Car).unwrap(), (3, 1));
    }

    #[test]
    fn no_free_spot_is_none() {
        let mut ledger = SqliteLedger::in_memory().unwrap();
        ledger.provision(1, 0).unwrap();
        ledger.update_spot_availability(1, false).unwrap();
        assert_eq!(ledger.find_available_spot(VehicleCategory::Car).unwrap(), None);
        assert_eq!(ledger.find_available_spot(VehicleCategory::Bike).unwrap(), None);
        assert!(!ledger.update_spot_availability(9, true).unwrap());
    }

    #[test]
    fn ticket_roundtrips_through_rows() {
        let (mut ledger, _dir) = temp_ledger();
        let spot = ParkingSpot { id: 2, category: VehicleCategory::Car, available: false };
        let in_time = Utc::now() - Duration::minutes(45);
        let mut t = Ticket::open(spot, "ABCDEF", in_time, true);
        t.id = Some(ledger.save_ticket(&t).unwrap());

        let open = ledger.open_ticket("ABCDEF").unwrap().expect("open ticket");
        assert_eq!(open.id, t.id);
        assert_eq!(open.spot.id, 2);
        assert_eq!(open.spot.category, VehicleCategory::Car);
        assert!(open.is_loyalty_customer);
        assert!(open.out_time.is_none());
        assert!((open.in_time - in_time).num_milliseconds().abs() < 1);

        t.out_time = Some(Utc::now());
        t.price = 1.12;
        assert!(ledger.update_ticket(&t).unwrap());
        assert!(ledger.open_ticket("ABCDEF").unwrap().is_none());
        assert_eq!(ledger.ticket_count("ABCDEF").unwrap(), 1);

        let closed = ledger.ticket(t.id.unwrap()).unwrap().expect("closed ticket");
        assert!((closed.price - 1.12).abs() < 1e-9);
        assert!(closed.out_time.is_some());
    }

    #[test]
    fn closed_ticket_row_is_final() {
        let (mut ledger, _dir) = temp_ledger();
        let spot = ParkingSpot { id: 1, category: VehicleCategory::Car, available: false };
        let mut t = Ticket::open(spot, "ABCDEF", Utc::now() - Duration::minutes(60), false);
        t.id = Some(ledger.save_ticket(&t).unwrap());
        t.out_time = Some(Utc::now());
        t.price = 1.5;
        assert!(ledger.update_ticket(&t).unwrap());

        t.price = 99.0;
        t.out_time = Some(Utc::now() + Duration::minutes(5));
        assert!(!ledger.update_ticket(&t).unwrap());
        let stored = ledger.ticket(t.id.unwrap()).unwrap().expect("stored ticket");
        assert!((stored.price - 1.5).abs() < 1e-9);
    }

    #[test]
    fn update_of_unknown_ticket_changes_nothing() {
        let (mut ledger, _dir) = temp_ledger();
        let spot = ParkingSpot { id: 1, category: VehicleCategory::Car, available: false };
        let mut t = Ticket::open(spot, "ABCDEF", Utc::now(), false);
        t.id = Some(99);
        t.out_time = Some(Utc::now());
        assert!(!ledger.update_ticket(&t).unwrap());
    }

    #[test]
    fn parking_a_car_then_leaving() {
        let (ledger, _dir) = temp_ledger();
        let start = Utc::now() - Duration::minutes(60);
        let clock = FixedClock::new(start);
        let mut lc = ParkingLifecycle::new(ledger, FareCalculator::default(), Box::new(clock.clone()));

        let ticket = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap();
        assert_eq!(ticket.spot.id, 1);
        assert!(ticket.out_time.is_none());
        assert!(!lc.ledger().spot(1).unwrap().unwrap().available);

        clock.advance(Duration::minutes(60));
        let closed = lc.handle_departure("ABCDEF").unwrap();

        let fetched = lc.ledger().ticket(closed.id.unwrap()).unwrap().expect("stored ticket");
        let out = fetched.out_time.expect("out time");
        assert!(out >= fetched.in_time);
        assert!(fetched.price > 0.0);
        // 60 min CAR, first visit
        assert!((fetched.price - 1.5).abs() < 0.01);
        assert!(lc.ledger().spot(1).unwrap().unwrap().available);
        assert_eq!(lc.ledger().find_available_spot(VehicleCategory::Car).unwrap(), Some(1));
    }

    #[test]
    fn recurring_user_gets_both_discounts() {
        let (ledger, _dir) = temp_ledger();
        let clock = FixedClock::new(Utc::now() - Duration::hours(3));
        let mut lc = ParkingLifecycle::new(ledger, FareCalculator::default(), Box::new(clock.clone()));

        lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap();
        clock.advance(Duration::minutes(60));
        lc.handle_departure("ABCDEF").unwrap();

        let second = lc.handle_arrival("ABCDEF", VehicleCategory::Car).unwrap();
        assert!(second.is_loyalty_customer);
        clock.advance(Duration::minutes(60));
        let closed = lc.handle_departure("ABCDEF").unwrap();

        assert_eq!(lc.ledger().ticket_count("ABCDEF").unwrap(), 2);
        assert!((closed.price - 1.5 * 0.95 * 0.95).abs() < 0.01);
    }

    #[test]
    fn second_departure_has_nothing_to_close() {
        let (ledger, _dir) = temp_ledger();
        let mut lc = ParkingLifecycle::new(ledger, FareCalculator::default(), Box::new(FixedClock::new(Utc::now())));
        lc.handle_arrival("ABCDEF", VehicleCategory::Bike).unwrap();
        lc.handle_departure("ABCDEF").unwrap();
        assert!(matches!(lc.handle_departure("ABCDEF"), Err(ParkingError::NoOpenTicket { .. })));
    }
}
