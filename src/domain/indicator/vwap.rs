//! Intraday Volume Weighted Average Price.
//!
//! Accumulates typical price × volume and volume within each calendar day,
//! resetting at the first bar of the next day, then shifts one bar.

use crate::domain::error::QuantError;
use crate::domain::indicator::window::shift;
use crate::domain::ohlcv::PriceTable;

pub fn calculate_vwap(table: &PriceTable) -> Result<Vec<f64>, QuantError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    if !table.is_intraday() {
        return Err(QuantError::configuration(
            "VWAP can only be calculated on intraday data",
        ));
    }

    let typical = table.typical_price();
    let volume = table.volume();
    let index = table.index();
    let mut values = Vec::with_capacity(table.len());
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    for i in 0..table.len() {
        if i > 0 && index[i].date() != index[i - 1].date() {
            cum_pv = 0.0;
            cum_vol = 0.0;
        }
        cum_pv += typical[i] * volume[i];
        cum_vol += volume[i];
        values.push(if cum_vol == 0.0 { f64::NAN } else { cum_pv / cum_vol });
    }

    Ok(shift(&values, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::NaiveDate;

    fn bar(day: u32, hour: u32, price: f64, volume: f64) -> OhlcvBar {
        OhlcvBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    #[test]
    fn vwap_resets_each_day() {
        let table = PriceTable::from_bars(&[
            bar(1, 10, 100.0, 1.0),
            bar(1, 11, 110.0, 3.0),
            bar(2, 10, 200.0, 2.0),
            bar(2, 11, 210.0, 2.0),
        ])
        .unwrap();
        let v = calculate_vwap(&table).unwrap();
        assert!(v[0].is_nan());
        assert!((v[1] - 100.0).abs() < 1e-9);
        assert!((v[2] - (100.0 + 330.0) / 4.0).abs() < 1e-9);
        // day two starts fresh
        assert!((v[3] - 200.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_rejects_daily_data() {
        let table = PriceTable::from_bars(&[bar(1, 0, 1.0, 1.0), bar(2, 0, 1.0, 1.0)]).unwrap();
        let err = calculate_vwap(&table).unwrap_err();
        assert!(matches!(err, QuantError::Configuration { .. }));
    }
}
