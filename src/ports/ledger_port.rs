//! Instrument and booking store port trait.

use crate::domain::booking::Booking;
use crate::domain::error::DepotError;
use crate::domain::instrument::Instrument;

pub trait LedgerPort {
    fn load_instruments(&self) -> Result<Vec<Instrument>, DepotError>;

    fn load_bookings(&self) -> Result<Vec<Booking>, DepotError>;

    /// Raw contents of both tables, one part per table so that the
    /// boundary between them is part of the identity.
    fn fingerprint(&self) -> Result<Vec<Vec<u8>>, DepotError>;
}
