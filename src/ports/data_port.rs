//! Market data access port trait.

use crate::domain::error::QuantError;
use crate::domain::ohlcv::PriceTable;
use crate::domain::strategy::Frequency;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars of `symbol` at `frequency` whose date lies in `start..=end`.
    fn fetch_table(
        &self,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, QuantError>;

    /// Frequencies for which data for `symbol` exists.
    fn available_frequencies(&self, symbol: &str) -> Result<Vec<Frequency>, QuantError>;
}
