// ===============================
// src/memory.rs (in-memory ledger)
// ===============================
use ahash::AHashMap as HashMap;

use crate::domain::{ParkingSpot, SpotId, Ticket, TicketId, VehicleCategory};
use crate::ledger::{LedgerError, TicketLedger};

/// Ledger that lives in process memory. Dipakai kalau DATABASE_PATH kosong.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    spots: HashMap<SpotId, ParkingSpot>,
    tickets: Vec<Ticket>,
}

impl MemoryLedger {
    pub fn new() -> Self { Self::default() }

    /// Spots 1..=car are CAR, the next `bike` ids are BIKE.
    pub fn with_spots(car: u32, bike: u32) -> Self {
        let mut ledger = Self::new();
        ledger.provision(car, bike);
        ledger
    }

    pub fn provision(&mut self, car: u32, bike: u32) {
        if !self.spots.is_empty() {
            return;
        }
        for id in 1..=car {
            self.spots.insert(id, ParkingSpot { id, category: VehicleCategory::Car, available: true });
        }
        for id in (car + 1)..=car.saturating_add(bike) {
            self.spots.insert(id, ParkingSpot { id, category: VehicleCategory::Bike, available: true });
        }
    }

    #[cfg(test)]
    pub fn spot(&self, id: SpotId) -> Option<&ParkingSpot> { self.spots.get(&id) }
}

impl TicketLedger for MemoryLedger {
    fn open_ticket(&self, reg: &str) -> Result<Option<Ticket>, LedgerError> {
        // newest first, like ORDER BY IN_TIME DESC
        Ok(self
            .tickets
            .iter()
            .rev()
            .find(|t| t.vehicle_registration == reg && t.is_open())
            .cloned())
    }

    fn ticket_count(&self, reg: &str) -> Result<u32, LedgerError> {
        Ok(self.tickets.iter().filter(|t| t.vehicle_registration == reg).count() as u32)
    }

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, LedgerError> {
        if id < 1 {
            return Ok(None);
        }
        Ok(self.tickets.get((id - 1) as usize).cloned())
    }

    fn save_ticket(&mut self, ticket: &Ticket) -> Result<TicketId, LedgerError> {
        let id = self.tickets.len() as TicketId + 1;
        let mut stored = ticket.clone();
        stored.id = Some(id);
        self.tickets.push(stored);
        Ok(id)
    }

    fn update_ticket(&mut self, ticket: &Ticket) -> Result<bool, LedgerError> {
        let Some(id) = ticket.id else { return Ok(false) };
        if id < 1 {
            return Ok(false);
        }
        match self.tickets.get_mut((id - 1) as usize) {
            // CLOSED is terminal
            Some(stored) if !stored.is_open() => Ok(false),
            Some(stored) => {
                stored.price = ticket.price;
                stored.out_time = ticket.out_time;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_available_spot(&self, category: VehicleCategory) -> Result<Option<SpotId>, LedgerError> {
        Ok(self
            .spots
            .values()
            .filter(|s| s.category == category && s.available)
            .map(|s| s.id)
            .min())
    }

    fn update_spot_availability(&mut self, spot: SpotId, available: bool) -> Result<bool, LedgerError> {
        match self.spots.get_mut(&spot) {
            Some(s) => {
                s.available = available;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn occupancy(&self, category: VehicleCategory) -> Result<(u32, u32), LedgerError> {
        let (mut total, mut occupied) = (0u32, 0u32);
        for s in self.spots.values().filter(|s| s.category == category) {
            total += 1;
            if !s.available { occupied += 1; }
        }
        Ok((total, occupied))
    }
}
