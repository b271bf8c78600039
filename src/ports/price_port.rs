//! Price series provider port trait.

use crate::domain::error::DepotError;
use crate::domain::price::PriceQuote;

pub trait PricePort {
    fn load_prices(&self) -> Result<Vec<PriceQuote>, DepotError>;

    /// Raw contents of the price source, one part per file.
    fn fingerprint(&self) -> Result<Vec<Vec<u8>>, DepotError>;
}
