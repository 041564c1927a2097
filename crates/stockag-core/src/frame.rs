//! Polars conversions for price history.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::{
    error::{DataError, Result},
    types::PriceHistoryPoint,
};

/// Days since the Unix epoch, the physical representation of a polars `Date`.
fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    i32::try_from((date - epoch).num_days()).unwrap_or(i32::MAX)
}

/// Builds a DataFrame with columns `date, open, high, low, close, volume`.
///
/// Absent values become nulls. Row order follows the input.
pub fn price_history_frame(points: &[PriceHistoryPoint]) -> Result<DataFrame> {
    let dates: Vec<i32> = points.iter().map(|p| epoch_days(p.date)).collect();
    let opens: Vec<Option<f64>> = points.iter().map(|p| p.open).collect();
    let highs: Vec<Option<f64>> = points.iter().map(|p| p.high).collect();
    let lows: Vec<Option<f64>> = points.iter().map(|p| p.low).collect();
    let closes: Vec<Option<f64>> = points.iter().map(|p| p.close).collect();
    let volumes: Vec<Option<f64>> = points.iter().map(|p| p.volume).collect();

    let date_col = Column::new("date".into(), dates)
        .cast(&DataType::Date)
        .map_err(|e| DataError::Other(e.to_string()))?;

    DataFrame::new(vec![
        date_col,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::Other(e.to_string()))
}
