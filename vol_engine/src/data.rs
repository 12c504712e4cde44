//! data.rs - Price inputs and the price → percentage-return transform
//!
//!   r_t = 100 · (P_t / P_{t-1} − 1)
//!
//! The first observation has no predecessor and is dropped. Any return that
//! touches a missing/NaN price is dropped as well (never zero-filled), so a
//! complete input of N prices yields exactly N − 1 returns.
//!
//! Prices must be strictly positive; a zero or negative price is rejected
//! rather than divided through.

use std::fmt;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VolError};

/// Column names accepted as the price field, in preference order.
pub const PRICE_COLUMNS: [&str; 2] = ["close", "price"];
/// Column names recognised as the time index of a frame.
pub const TIME_COLUMNS: [&str; 4] = ["date", "datetime", "timestamp", "time"];

/// Key of one observation: its timestamp when the input carries one,
/// otherwise the row position in the original price input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexKey {
    Position(usize),
    Time(DateTime<Utc>),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Position(i) => write!(f, "{i}"),
            IndexKey::Time(t) if t.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", t.format("%Y-%m-%d"))
            }
            IndexKey::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Anything a caller can hand the engine as "price data".
#[derive(Debug, Clone)]
pub enum PriceData {
    /// Bare prices, indexed by position.
    Values(Vec<f64>),
    /// Timestamped prices in chronological order.
    Points(Vec<PricePoint>),
    /// Tabular data with a `close` or `price` column.
    Frame(DataFrame),
}

impl From<Vec<f64>> for PriceData {
    fn from(v: Vec<f64>) -> Self {
        PriceData::Values(v)
    }
}

impl From<&[f64]> for PriceData {
    fn from(v: &[f64]) -> Self {
        PriceData::Values(v.to_vec())
    }
}

impl From<Vec<PricePoint>> for PriceData {
    fn from(v: Vec<PricePoint>) -> Self {
        PriceData::Points(v)
    }
}

impl From<DataFrame> for PriceData {
    fn from(df: DataFrame) -> Self {
        PriceData::Frame(df)
    }
}

/// Ordered (index, percentage return) pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReturnSeries {
    index: Vec<IndexKey>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Build a series directly. Index must be strictly increasing and every
    /// value finite.
    pub fn new(index: Vec<IndexKey>, values: Vec<f64>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(VolError::InvalidInput(format!(
                "index length ({}) doesn't match values length ({})",
                index.len(),
                values.len()
            )));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(VolError::InvalidInput(format!("non-finite return {v}")));
        }
        ensure_increasing(&index)?;
        Ok(Self { index, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self) -> &[IndexKey] {
        &self.index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Derive percentage returns from price data.
pub fn prepare_returns(data: &PriceData) -> Result<ReturnSeries> {
    let rows = match data {
        PriceData::Values(prices) => prices
            .iter()
            .enumerate()
            .map(|(i, &p)| (IndexKey::Position(i), Some(p)))
            .collect(),
        PriceData::Points(points) => points
            .iter()
            .map(|pt| (IndexKey::Time(pt.timestamp), Some(pt.price)))
            .collect(),
        PriceData::Frame(df) => frame_rows(df)?,
    };
    returns_from_rows(rows)
}

fn returns_from_rows(rows: Vec<(IndexKey, Option<f64>)>) -> Result<ReturnSeries> {
    // NaN counts as missing; anything else must be strictly positive.
    let rows: Vec<(IndexKey, Option<f64>)> = rows
        .into_iter()
        .map(|(k, p)| (k, p.filter(|v| !v.is_nan())))
        .collect();

    for (key, price) in &rows {
        if let Some(p) = price {
            if !p.is_finite() || *p <= 0.0 {
                return Err(VolError::InvalidInput(format!(
                    "price at {key} must be positive and finite, got {p}"
                )));
            }
        }
    }
    let keys: Vec<IndexKey> = rows.iter().map(|(k, _)| *k).collect();
    ensure_increasing(&keys)?;

    let mut index = Vec::with_capacity(rows.len().saturating_sub(1));
    let mut values = Vec::with_capacity(rows.len().saturating_sub(1));
    for w in rows.windows(2) {
        if let (Some(prev), Some(curr)) = (w[0].1, w[1].1) {
            index.push(w[1].0);
            values.push(100.0 * (curr / prev - 1.0));
        }
    }
    Ok(ReturnSeries { index, values })
}

fn ensure_increasing(index: &[IndexKey]) -> Result<()> {
    match index.windows(2).find(|w| w[0] >= w[1]) {
        Some(w) => Err(VolError::InvalidInput(format!(
            "index must be strictly increasing: {} is followed by {}",
            w[0], w[1]
        ))),
        None => Ok(()),
    }
}

// ── Tabular input ─────────────────────────────────────────────────────────

fn find_column(df: &DataFrame, candidates: &[&str]) -> Option<String> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    candidates.iter().find_map(|want| {
        names
            .iter()
            .find(|n| n.eq_ignore_ascii_case(want))
            .cloned()
    })
}

fn frame_rows(df: &DataFrame) -> Result<Vec<(IndexKey, Option<f64>)>> {
    let price_col = find_column(df, &PRICE_COLUMNS).ok_or_else(|| {
        VolError::InvalidInput(format!(
            "price frame needs a 'close' or 'price' column, found {:?}",
            df.get_column_names()
        ))
    })?;

    let prices = df
        .column(&price_col)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let prices: Vec<Option<f64>> = prices.f64()?.into_iter().collect();

    let keys = match find_column(df, &TIME_COLUMNS) {
        Some(time_col) => time_keys(df.column(&time_col)?.as_materialized_series())?,
        None => (0..prices.len()).map(IndexKey::Position).collect(),
    };

    Ok(keys.into_iter().zip(prices).collect())
}

fn time_keys(s: &Series) -> Result<Vec<IndexKey>> {
    let missing = || VolError::InvalidInput(format!("time column '{}' has missing values", s.name()));

    let stamps: Vec<Option<DateTime<Utc>>> = match s.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = s.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .map(|v| v.and_then(|v| from_epoch(v, unit)))
                .collect()
        }
        DataType::Date => {
            let raw = s.cast(&DataType::Int32)?;
            raw.i32()?
                .into_iter()
                .map(|d| d.and_then(|d| DateTime::from_timestamp(i64::from(d) * 86_400, 0)))
                .collect()
        }
        DataType::String => s
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_timestamp))
            .collect(),
        dt if dt.is_integer() => {
            // Integer columns are epoch milliseconds.
            let raw = s.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .map(|v| v.and_then(DateTime::from_timestamp_millis))
                .collect()
        }
        other => {
            return Err(VolError::InvalidInput(format!(
                "time column '{}' has unsupported type {other}",
                s.name()
            )))
        }
    };

    stamps
        .into_iter()
        .map(|t| t.map(IndexKey::Time).ok_or_else(|| missing()))
        .collect()
}

fn from_epoch(v: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
        TimeUnit::Nanoseconds => {
            let secs = v.div_euclid(1_000_000_000);
            let nanos = v.rem_euclid(1_000_000_000) as u32;
            DateTime::from_timestamp(secs, nanos)
        }
    }
}

fn parse_timestamp(v: &str) -> Option<DateTime<Utc>> {
    let v = v.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(v) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Load a price frame from a `.csv` or `.parquet` file.
pub fn load_prices(path: impl AsRef<Path>) -> Result<PriceData> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let df = match ext.as_str() {
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "parquet" | "pq" => {
            let file = File::open(path).map_err(|e| {
                VolError::InvalidInput(format!("cannot open {}: {e}", path.display()))
            })?;
            ParquetReader::new(file).finish()?
        }
        _ => {
            return Err(VolError::InvalidInput(format!(
                "unsupported price file '{}': expected .csv or .parquet",
                path.display()
            )))
        }
    };
    tracing::debug!("loaded {} rows from {}", df.height(), path.display());
    Ok(PriceData::Frame(df))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_returns_from_values() {
        let r = prepare_returns(&vec![100.0, 110.0, 99.0].into()).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r.values()[0] - 10.0).abs() < 1e-9);
        assert!((r.values()[1] + 10.0).abs() < 1e-9);
        // The first price has no predecessor; returns are keyed by the later row.
        assert_eq!(r.index(), &[IndexKey::Position(1), IndexKey::Position(2)]);
    }

    #[test]
    fn length_is_n_minus_one_and_formula_reproduces() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let r = prepare_returns(&prices.clone().into()).unwrap();
        assert_eq!(r.len(), prices.len() - 1);
        for (i, v) in r.values().iter().enumerate() {
            let expected = 100.0 * (prices[i + 1] / prices[i] - 1.0);
            assert!((v - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn single_price_gives_empty_series() {
        let r = prepare_returns(&vec![42.0].into()).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let err = prepare_returns(&vec![100.0, 0.0, 101.0].into()).unwrap_err();
        assert!(matches!(err, VolError::InvalidInput(_)));
        let err = prepare_returns(&vec![100.0, -5.0].into()).unwrap_err();
        assert!(matches!(err, VolError::InvalidInput(_)));
    }

    #[test]
    fn nan_price_drops_neighbouring_returns() {
        let r = prepare_returns(&vec![100.0, f64::NAN, 102.0, 103.0].into()).unwrap();
        // 100→NaN and NaN→102 are undefined; only 102→103 survives.
        assert_eq!(r.len(), 1);
        assert_eq!(r.index(), &[IndexKey::Position(3)]);
        assert!(r.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn points_keep_timestamps_and_require_order() {
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t1 = DateTime::from_timestamp(1_700_086_400, 0).unwrap();
        let pts = vec![PricePoint::new(t0, 50.0), PricePoint::new(t1, 55.0)];
        let r = prepare_returns(&pts.into()).unwrap();
        assert_eq!(r.index(), &[IndexKey::Time(t1)]);
        assert!((r.values()[0] - 10.0).abs() < 1e-9);

        let unordered = vec![PricePoint::new(t1, 50.0), PricePoint::new(t0, 55.0)];
        assert!(prepare_returns(&unordered.into()).is_err());
    }

    #[test]
    fn frame_with_close_and_epoch_dates() {
        let df = df!(
            "date" => &[1_700_000_000_000_i64, 1_700_086_400_000, 1_700_172_800_000],
            "Close" => &[100.0, 110.0, 99.0]
        )
        .unwrap();
        let r = prepare_returns(&df.into()).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r.values()[1] + 10.0).abs() < 1e-9);
        let expected = DateTime::from_timestamp_millis(1_700_086_400_000).unwrap();
        assert_eq!(r.index()[0], IndexKey::Time(expected));
    }

    #[test]
    fn frame_with_price_column_and_string_dates() {
        let df = df!(
            "Date" => &["2024-01-02", "2024-01-03", "2024-01-04"],
            "price" => &[10.0, 11.0, 12.1]
        )
        .unwrap();
        let r = prepare_returns(&df.into()).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.index()[0].to_string(), "2024-01-03");
    }

    #[test]
    fn frame_without_price_column_is_invalid() {
        let df = df!("open" => &[1.0, 2.0], "volume" => &[10.0, 20.0]).unwrap();
        let err = prepare_returns(&df.into()).unwrap_err();
        assert!(matches!(err, VolError::InvalidInput(_)));
    }

    #[test]
    fn frame_without_time_column_is_positional() {
        let df = df!("close" => &[1.0, 2.0, 4.0]).unwrap();
        let r = prepare_returns(&df.into()).unwrap();
        assert_eq!(r.index(), &[IndexKey::Position(1), IndexKey::Position(2)]);
        assert!((r.values()[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn load_rejects_unknown_extension() {
        assert!(matches!(
            load_prices("prices.xlsx"),
            Err(VolError::InvalidInput(_))
        ));
    }
}
