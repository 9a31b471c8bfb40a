use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::error::{InsightsError, InsightsResult};
use crate::types::{Fundamentals, FundamentalsRecord, PriceRecord};

/// Immutable price history: unique (date, symbol) rows sorted by date, then symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricePanel {
    records: Vec<PriceRecord>,
    symbols: Vec<String>,
    dates: Vec<NaiveDate>,
}

/// Date x symbol close matrix. `values[row][col]` is `None` where a symbol
/// has no observation on that date.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseMatrix {
    pub dates: Vec<NaiveDate>,
    pub symbols: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl PricePanel {
    pub fn new(mut records: Vec<PriceRecord>) -> InsightsResult<Self> {
        if let Some(bad) = records.iter().find(|r| !r.close.is_finite() || !r.volume.is_finite()) {
            return Err(InsightsError::InvalidData(format!(
                "non-finite close or volume for {} on {}",
                bad.symbol, bad.date
            )));
        }

        records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));

        if let Some(dup) = records
            .windows(2)
            .find(|w| w[0].date == w[1].date && w[0].symbol == w[1].symbol)
        {
            return Err(InsightsError::InvalidData(format!(
                "duplicate row for {} on {}",
                dup[0].symbol, dup[0].date
            )));
        }

        Ok(Self::from_sorted(records))
    }

    fn from_sorted(records: Vec<PriceRecord>) -> Self {
        let symbols: Vec<String> = records
            .iter()
            .map(|r| r.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        dates.dedup();

        Self {
            records,
            symbols,
            dates,
        }
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    /// Symbols in the fixed (sorted) order used for every weight vector.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn record(&self, date: NaiveDate, symbol: &str) -> Option<&PriceRecord> {
        self.records
            .binary_search_by(|r| r.date.cmp(&date).then_with(|| r.symbol.as_str().cmp(symbol)))
            .ok()
            .map(|idx| &self.records[idx])
    }

    pub fn close(&self, date: NaiveDate, symbol: &str) -> Option<f64> {
        self.record(date, symbol).map(|r| r.close)
    }

    /// Most recent observation for `symbol`.
    pub fn last_close(&self, symbol: &str) -> Option<(NaiveDate, f64)> {
        self.records
            .iter()
            .rev()
            .find(|r| r.symbol == symbol)
            .map(|r| (r.date, r.close))
    }

    /// Close series for one symbol in date order.
    pub fn closes_for(&self, symbol: &str) -> Vec<(NaiveDate, f64)> {
        self.records
            .iter()
            .filter(|r| r.symbol == symbol)
            .map(|r| (r.date, r.close))
            .collect()
    }

    pub fn close_matrix(&self) -> CloseMatrix {
        let column: BTreeMap<&str, usize> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut values: Vec<Vec<Option<f64>>> = Vec::with_capacity(self.dates.len());
        let mut row_idx = 0usize;
        let mut current: Option<NaiveDate> = None;
        for record in &self.records {
            if current != Some(record.date) {
                if current.is_some() {
                    row_idx += 1;
                }
                current = Some(record.date);
                values.push(vec![None; self.symbols.len()]);
            }
            if let Some(&col) = column.get(record.symbol.as_str()) {
                values[row_idx][col] = Some(record.close);
            }
        }

        CloseMatrix {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            values,
        }
    }

    /// Rows with `start <= date <= end`; either bound may be open.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PricePanel {
        let records = self
            .records
            .iter()
            .filter(|r| start.map_or(true, |s| r.date >= s) && end.map_or(true, |e| r.date <= e))
            .cloned()
            .collect();
        Self::from_sorted(records)
    }

    pub fn before(&self, date: NaiveDate) -> PricePanel {
        let records = self.records.iter().filter(|r| r.date < date).cloned().collect();
        Self::from_sorted(records)
    }

    pub fn on_or_after(&self, date: NaiveDate) -> PricePanel {
        self.between(Some(date), None)
    }

    /// Same rows with every close replaced, in record order.
    pub fn with_closes(&self, closes: &[f64]) -> InsightsResult<PricePanel> {
        if closes.len() != self.records.len() {
            return Err(InsightsError::InvalidData(format!(
                "expected {} closes, got {}",
                self.records.len(),
                closes.len()
            )));
        }
        let records = self
            .records
            .iter()
            .zip(closes)
            .map(|(r, &close)| PriceRecord {
                close,
                ..r.clone()
            })
            .collect();
        Ok(Self::from_sorted(records))
    }
}

/// Fundamentals keyed by (date, symbol)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundamentalsPanel {
    rows: BTreeMap<(NaiveDate, String), Fundamentals>,
}

impl FundamentalsPanel {
    pub fn new(records: Vec<FundamentalsRecord>) -> InsightsResult<Self> {
        let mut rows = BTreeMap::new();
        for record in records {
            let key = (record.date, record.symbol);
            if rows.insert(key.clone(), record.values).is_some() {
                return Err(InsightsError::InvalidData(format!(
                    "duplicate fundamentals for {} on {}",
                    key.1, key.0
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn get(&self, date: NaiveDate, symbol: &str) -> Option<&Fundamentals> {
        self.rows.get(&(date, symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn panel() -> PricePanel {
        PricePanel::new(vec![
            PriceRecord::new(d("2024-01-03"), "XOM", 101.0, 10.0),
            PriceRecord::new(d("2024-01-02"), "XOM", 100.0, 10.0),
            PriceRecord::new(d("2024-01-02"), "JPM", 50.0, 20.0),
            PriceRecord::new(d("2024-01-04"), "JPM", 52.0, 20.0),
            PriceRecord::new(d("2024-01-04"), "XOM", 99.0, 10.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_panel_is_sorted_with_fixed_symbol_order() {
        let p = panel();
        assert_eq!(p.symbols(), &["JPM".to_string(), "XOM".to_string()]);
        assert_eq!(p.dates().len(), 3);
        assert_eq!(p.records()[0].symbol, "JPM");
        assert_eq!(p.last_date(), Some(d("2024-01-04")));
        assert_eq!(p.close(d("2024-01-03"), "XOM"), Some(101.0));
        assert_eq!(p.close(d("2024-01-03"), "JPM"), None);
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let result = PricePanel::new(vec![
            PriceRecord::new(d("2024-01-02"), "XOM", 100.0, 10.0),
            PriceRecord::new(d("2024-01-02"), "XOM", 101.0, 10.0),
        ]);
        assert!(matches!(result, Err(InsightsError::InvalidData(_))));
    }

    #[test]
    fn test_close_matrix_marks_gaps() {
        let m = panel().close_matrix();
        assert_eq!(m.values.len(), 3);
        assert_eq!(m.values[0], vec![Some(50.0), Some(100.0)]);
        assert_eq!(m.values[1], vec![None, Some(101.0)]);
        assert_eq!(m.values[2], vec![Some(52.0), Some(99.0)]);
    }

    #[test]
    fn test_window_slicing() {
        let p = panel();
        assert_eq!(p.before(d("2024-01-03")).len(), 2);
        assert_eq!(p.on_or_after(d("2024-01-03")).len(), 3);
        assert_eq!(p.between(Some(d("2024-01-03")), Some(d("2024-01-03"))).len(), 1);
        assert_eq!(p.last_close("JPM"), Some((d("2024-01-04"), 52.0)));
    }

    #[test]
    fn test_with_closes_replaces_in_record_order() {
        let p = panel();
        let replaced = p.with_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(replaced.close(d("2024-01-02"), "JPM"), Some(1.0));
        assert_eq!(replaced.close(d("2024-01-04"), "XOM"), Some(5.0));
        assert!(p.with_closes(&[1.0]).is_err());
    }
}
