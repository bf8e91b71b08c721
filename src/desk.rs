// ===============================
// src/desk.rs (console shell)
// ===============================
//
// Menu interaktif di atas ParkingLifecycle:
//   1 kendaraan masuk, 2 kendaraan keluar, 3 shutdown.
// Desk yang baca input, render teks ke console, kirim Event ke recorder,
// dan update gauge okupansi. Tidak ada aturan bisnis di sini.
//
use std::fmt::Display;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::allocator::SpotAllocator;
use crate::domain::{Event, Operation, ParkingRecord, VehicleCategory};
use crate::input::{InputError, InputReader, CATEGORY_MENU};
use crate::ledger::TicketLedger;
use crate::lifecycle::{ParkingError, ParkingLifecycle};
use crate::metrics::{SPOTS_OCCUPIED, SPOTS_TOTAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice { Incoming, Exiting, Shutdown }

impl MenuChoice {
    pub fn from_selection(code: u32) -> Result<Self, InputError> {
        match code {
            1 => Ok(MenuChoice::Incoming),
            2 => Ok(MenuChoice::Exiting),
            3 => Ok(MenuChoice::Shutdown),
            _ => Err(InputError::InvalidSelection(code.to_string())),
        }
    }
}

pub struct ParkingDesk<L: TicketLedger, I: InputReader, W: Write> {
    lifecycle: ParkingLifecycle<L>,
    input: I,
    out: W,
    events: Option<mpsc::Sender<Event>>,
}

impl<L: TicketLedger, I: InputReader, W: Write> ParkingDesk<L, I, W> {
    pub fn new(lifecycle: ParkingLifecycle<L>, input: I, out: W, events: Option<mpsc::Sender<Event>>) -> Self {
        Self { lifecycle, input, out, events }
    }

    #[cfg(test)]
    pub fn lifecycle(&self) -> &ParkingLifecycle<L> { &self.lifecycle }

    fn say(&mut self, msg: impl Display) {
        let _ = writeln!(self.out, "{msg}");
    }

    fn emit(&self, ev: Event) {
        if let Some(tx) = &self.events {
            // recorder lambat/penuh -> event di-drop, desk tidak boleh blocking
            let _ = tx.try_send(ev);
        }
    }

    /// Menu loop. Returns when the user picks shutdown or input closes.
    pub fn run(&mut self) {
        self.refresh_gauges();
        loop {
            self.say("Please select an option. Simply enter the number to choose an action");
            self.say("1 New Vehicle Entering - Allocate Parking Space");
            self.say("2 Vehicle Exiting - Generate Ticket Price");
            self.say("3 Shutdown System");

            let choice = match self.input.read_selection().and_then(MenuChoice::from_selection) {
                Ok(c) => c,
                Err(InputError::Closed) => break,
                Err(e) => {
                    debug!(error = %e, "bad menu entry");
                    self.say("Unsupported option. Please enter a number corresponding to the provided menu");
                    continue;
                }
            };
            match choice {
                MenuChoice::Incoming => {
                    self.process_incoming_vehicle();
                }
                MenuChoice::Exiting => {
                    self.process_exiting_vehicle();
                }
                MenuChoice::Shutdown => {
                    self.say("Exiting from the system!");
                    break;
                }
            }
        }
        info!("desk stopped");
    }

    pub fn process_incoming_vehicle(&mut self) -> Option<ParkingRecord> {
        self.say("Please select vehicle type from menu");
        for (code, cat) in CATEGORY_MENU {
            self.say(format!("{code} {cat}"));
        }
        let category = match self.input.read_category() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "error parsing user input for type of vehicle");
                self.say("Incorrect input provided");
                return None;
            }
        };
        // cek spot kosong dulu sebelum tanya plat nomor
        match SpotAllocator::new(self.lifecycle.ledger()).find_available(category) {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.report("incoming", "-", &ParkingError::LotFull { category });
                return None;
            }
            Err(e) => debug!(%category, error = %e, "spot pre-check failed, lifecycle decides"),
        }
        let reg = self.read_registration()?;

        match self.lifecycle.handle_arrival(&reg, category) {
            Ok(ticket) => {
                if ticket.is_loyalty_customer {
                    self.say("Welcome back! As a recurring user of our parking lot, you'll benefit from a 5% discount.");
                }
                self.say("Generated Ticket and saved in DB");
                self.say(format!("Please park your vehicle in spot number:{}", ticket.spot.id));
                self.say(format!("Recorded in-time for vehicle number:{} is:{}", reg, ticket.in_time));
                let rec = ParkingRecord::from_ticket(Operation::Arrival, &ticket);
                self.emit(Event::Record(rec.clone()));
                self.refresh_gauges();
                Some(rec)
            }
            Err(e) => {
                self.report("incoming", &reg, &e);
                None
            }
        }
    }

    pub fn process_exiting_vehicle(&mut self) -> Option<ParkingRecord> {
        let reg = self.read_registration()?;

        match self.lifecycle.handle_departure(&reg) {
            Ok(ticket) => {
                // render what the ledger actually stored
                let ticket = match ticket.id.map(|id| self.lifecycle.ledger().ticket(id)) {
                    Some(Ok(Some(stored))) => stored,
                    _ => ticket,
                };
                self.say(format!("Please pay the parking fare:{:.2}", ticket.price));
                if let Some(out) = ticket.out_time {
                    self.say(format!("Recorded out-time for vehicle number:{reg} is:{out}"));
                }
                let rec = ParkingRecord::from_ticket(Operation::Departure, &ticket);
                self.emit(Event::Record(rec.clone()));
                self.refresh_gauges();
                Some(rec)
            }
            Err(e) => {
                self.report("exiting", &reg, &e);
                self.refresh_gauges();
                None
            }
        }
    }

    fn read_registration(&mut self) -> Option<String> {
        self.say("Please type the vehicle registration number and press enter key");
        match self.input.read_vehicle_registration() {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "unable to read vehicle registration");
                self.say("Invalid input provided");
                None
            }
        }
    }

    fn report(&mut self, op: &str, reg: &str, e: &ParkingError) {
        let msg = match e {
            ParkingError::LotFull { .. } => "Parking slots might be full, please try again later".to_string(),
            ParkingError::NoOpenTicket { .. } => format!("No ticket found for vehicle number: {reg}"),
            ParkingError::AlreadyParked { spot, .. } => format!("Vehicle {reg} is already parked in spot {spot}"),
            ParkingError::Persistence { .. } => format!("Unable to update parking information, error occurred: {e}"),
            _ => format!("Unable to process {op} vehicle: {e}"),
        };
        self.say(&msg);
        self.emit(Event::Note(format!("{op} {reg}: {e}")));
    }

    fn refresh_gauges(&self) {
        for cat in VehicleCategory::ALL {
            match self.lifecycle.ledger().occupancy(cat) {
                Ok((total, occupied)) => {
                    SPOTS_TOTAL.with_label_values(&[cat.as_str()]).set(total as i64);
                    SPOTS_OCCUPIED.with_label_values(&[cat.as_str()]).set(occupied as i64);
                }
                Err(e) => debug!(%cat, error = %e, "occupancy query failed"),
            }
        }
    }
}
