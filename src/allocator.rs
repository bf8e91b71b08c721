// ===============================
// src/allocator.rs
// ===============================
use tracing::debug;

use crate::domain::{ParkingSpot, VehicleCategory};
use crate::ledger::{LedgerError, TicketLedger};

/// Picks the next free spot of a category. Pure read: the spot is only
/// marked occupied later by the lifecycle.
pub struct SpotAllocator<'a, L: TicketLedger + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: TicketLedger + ?Sized> SpotAllocator<'a, L> {
    pub fn new(ledger: &'a L) -> Self { Self { ledger } }

    /// `Ok(None)` means the category is full. Id 0 is never a real spot.
    pub fn find_available(&self, category: VehicleCategory) -> Result<Option<ParkingSpot>, LedgerError> {
        let spot = match self.ledger.find_available_spot(category)? {
            Some(id) if id > 0 => Some(ParkingSpot { id, category, available: true }),
            _ => None,
        };
        debug!(%category, spot = ?spot.as_ref().map(|s| s.id), "spot lookup");
        Ok(spot)
    }
}
