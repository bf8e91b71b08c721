// ===============================
// src/input.rs
// ===============================
use std::io::BufRead;
use thiserror::Error;

use crate::domain::VehicleCategory;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid selection: {0:?}")]
    InvalidSelection(String),
    #[error("vehicle registration must not be empty")]
    EmptyRegistration,
    #[error("input closed")]
    Closed,
    #[error("input error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kode menu -> kategori. Di luar tabel = InvalidSelection.
pub const CATEGORY_MENU: [(u32, VehicleCategory); 2] = [(1, VehicleCategory::Car), (2, VehicleCategory::Bike)];

pub fn category_from_selection(code: u32) -> Result<VehicleCategory, InputError> {
    CATEGORY_MENU
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, cat)| *cat)
        .ok_or_else(|| InputError::InvalidSelection(code.to_string()))
}

pub trait InputReader {
    /// A numeric menu entry.
    fn read_selection(&mut self) -> Result<u32, InputError>;

    fn read_vehicle_registration(&mut self) -> Result<String, InputError>;

    fn read_category(&mut self) -> Result<VehicleCategory, InputError> {
        category_from_selection(self.read_selection()?)
    }
}

/// Line-oriented reader over stdin (or any `BufRead`).
pub struct ConsoleInput<R: BufRead> {
    reader: R,
}

impl<R: BufRead> ConsoleInput<R> {
    pub fn new(reader: R) -> Self { Self { reader } }

    fn next_line(&mut self) -> Result<String, InputError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(InputError::Closed);
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead> InputReader for ConsoleInput<R> {
    fn read_selection(&mut self) -> Result<u32, InputError> {
        let line = self.next_line()?;
        line.parse().map_err(|_| InputError::InvalidSelection(line))
    }

    fn read_vehicle_registration(&mut self) -> Result<String, InputError> {
        let line = self.next_line()?;
        if line.is_empty() {
            return Err(InputError::EmptyRegistration);
        }
        Ok(line)
    }
}
