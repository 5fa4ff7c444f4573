//! Column-split price frames (`{columns, index, data}`).
//!
//! Batched providers label columns with a `(field, ticker)` pair instead of a bare
//! field name. Both shapes are accepted here and collapsed to single-level
//! Open/High/Low/Close/Volume access before any bar reaches the feature engine.

use crate::domain::price::PriceBar;
use crate::ingest::FetchError;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SplitFrame {
    pub columns: Vec<ColumnLabel>,
    pub index: Vec<IndexValue>,
    pub data: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ColumnLabel {
    Flat(String),
    Levels(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    EpochMillis(i64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(PriceField::Open),
            "high" => Some(PriceField::High),
            "low" => Some(PriceField::Low),
            "close" => Some(PriceField::Close),
            "volume" => Some(PriceField::Volume),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl ColumnLabel {
    /// Field this column carries for `ticker`, or `None` when the column belongs to a
    /// different ticker or is not an OHLCV field (e.g. "Adj Close").
    pub fn resolve(&self, ticker: &str) -> Option<PriceField> {
        match self {
            ColumnLabel::Flat(name) => PriceField::parse(name),
            ColumnLabel::Levels(levels) => {
                let mut field = None;
                for level in levels {
                    if let Some(f) = PriceField::parse(level) {
                        field = field.or(Some(f));
                        continue;
                    }
                    let tag = level.trim();
                    if !tag.is_empty() && !tag.eq_ignore_ascii_case(ticker) {
                        return None;
                    }
                }
                field
            }
        }
    }
}

impl IndexValue {
    fn to_date(&self) -> Option<NaiveDate> {
        match self {
            IndexValue::EpochMillis(ms) => {
                DateTime::from_timestamp_millis(*ms).map(|dt| dt.date_naive())
            }
            IndexValue::Text(s) => {
                let day = s.trim().get(..10)?;
                NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
            }
        }
    }
}

impl SplitFrame {
    pub fn into_bars(self, ticker: &str) -> Result<Vec<PriceBar>, FetchError> {
        if self.index.len() != self.data.len() {
            return Err(FetchError::Malformed(format!(
                "index has {} rows but data has {}",
                self.index.len(),
                self.data.len()
            )));
        }

        // First matching column wins per field.
        let mut slots: [Option<usize>; 5] = [None; 5];
        for (col, label) in self.columns.iter().enumerate() {
            if let Some(field) = label.resolve(ticker) {
                slots[field.slot()].get_or_insert(col);
            }
        }

        if slots[PriceField::Close.slot()].is_none() {
            if self.index.is_empty() {
                return Ok(Vec::new());
            }
            return Err(FetchError::Malformed(format!(
                "no Close column for {ticker}"
            )));
        }

        let mut bars = Vec::with_capacity(self.data.len());
        for (idx, row) in self.index.iter().zip(self.data.iter()) {
            let date = idx
                .to_date()
                .ok_or_else(|| FetchError::Malformed(format!("invalid index value: {idx:?}")))?;

            let mut values = [None; 5];
            for field in PriceField::ALL {
                values[field.slot()] = slots[field.slot()]
                    .and_then(|col| row.get(col).copied().flatten());
            }

            if values.iter().all(Option::is_none) {
                continue;
            }

            let close = values[PriceField::Close.slot()].unwrap_or(f64::NAN);
            // Absent columns take the close; a gap in a present column stays NaN.
            let price = |f: PriceField| match slots[f.slot()] {
                Some(_) => values[f.slot()].unwrap_or(f64::NAN),
                None => close,
            };
            bars.push(PriceBar {
                date,
                open: price(PriceField::Open),
                high: price(PriceField::High),
                low: price(PriceField::Low),
                close: price(PriceField::Close),
                volume: values[PriceField::Volume.slot()]
                    .map(|v| v.max(0.0) as u64)
                    .unwrap_or(0),
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}
