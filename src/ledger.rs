// ===============================
// src/ledger.rs
// ===============================
//
// Kontrak penyimpanan tiket & ketersediaan spot.
// Core (lifecycle/allocator) hanya bicara lewat trait ini; engine-nya
// (memory / sqlite) bebas.
//
use thiserror::Error;

use crate::domain::{SpotId, Ticket, TicketId, VehicleCategory};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Storage contract consumed by the parking core.
///
/// Write methods report `Ok(false)` when the store accepted the call but
/// nothing was changed (unknown id, row already closed, ...). The core
/// treats that the same as an error.
pub trait TicketLedger {
    /// The ticket of `reg` that has no out-time yet, if any.
    fn open_ticket(&self, reg: &str) -> Result<Option<Ticket>, LedgerError>;

    /// Every ticket ever saved for `reg`, open or closed.
    fn ticket_count(&self, reg: &str) -> Result<u32, LedgerError>;

    fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, LedgerError>;

    /// Saves a new ticket and returns the id assigned to it.
    fn save_ticket(&mut self, ticket: &Ticket) -> Result<TicketId, LedgerError>;

    /// Writes price and out-time of an existing ticket.
    fn update_ticket(&mut self, ticket: &Ticket) -> Result<bool, LedgerError>;

    /// Lowest-id available spot of `category`.
    fn find_available_spot(&self, category: VehicleCategory) -> Result<Option<SpotId>, LedgerError>;

    fn update_spot_availability(&mut self, spot: SpotId, available: bool) -> Result<bool, LedgerError>;

    /// (total, occupied) for a category, used for gauges.
    fn occupancy(&self, category: VehicleCategory) -> Result<(u32, u32), LedgerError>;
}
