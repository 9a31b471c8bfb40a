use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{BacktestRecord, CellFailure, CellOutcome};

/// Risk-free rate as a map key, ordered by `f64::total_cmp`.
#[derive(Debug, Clone, Copy)]
pub struct RateKey(pub f64);

impl PartialEq for RateKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RateKey {}

impl PartialOrd for RateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Smallest |growth difference| per risk-free rate, ties broken by grid index.
///
/// `offer` and `merge` are a min over a total order, so any fold/reduce
/// schedule yields the same records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestRecords {
    by_rate: BTreeMap<RateKey, BacktestRecord>,
}

fn rank(record: &BacktestRecord) -> (f64, usize) {
    (record.growth_difference_percentage.abs(), record.grid_index)
}

fn improves(candidate: &BacktestRecord, current: &BacktestRecord) -> bool {
    let (a_diff, a_idx) = rank(candidate);
    let (b_diff, b_idx) = rank(current);
    a_diff.total_cmp(&b_diff).then(a_idx.cmp(&b_idx)) == Ordering::Less
}

impl BestRecords {
    pub fn offer(&mut self, record: BacktestRecord) {
        let key = RateKey(record.risk_free_rate);
        match self.by_rate.get(&key) {
            Some(current) if !improves(&record, current) => {}
            _ => {
                self.by_rate.insert(key, record);
            }
        }
    }

    pub fn merge(mut self, other: BestRecords) -> BestRecords {
        for record in other.by_rate.into_values() {
            self.offer(record);
        }
        self
    }

    pub fn get(&self, risk_free_rate: f64) -> Option<&BacktestRecord> {
        self.by_rate.get(&RateKey(risk_free_rate))
    }

    pub fn len(&self) -> usize {
        self.by_rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rate.is_empty()
    }

    pub fn into_records(self) -> Vec<BacktestRecord> {
        self.by_rate.into_values().collect()
    }
}

/// Fold state for a grid run
#[derive(Debug, Clone, Default)]
pub struct GridAccumulator {
    pub best: BestRecords,
    pub failures: Vec<CellFailure>,
    pub evaluated: usize,
    pub undefined: usize,
    pub skipped: usize,
}

impl GridAccumulator {
    pub fn record_outcome(mut self, outcome: CellOutcome) -> Self {
        self.evaluated += 1;
        match BacktestRecord::from_outcome(outcome) {
            Some(record) => self.best.offer(record),
            None => self.undefined += 1,
        }
        self
    }

    pub fn record_failure(mut self, failure: CellFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn record_skip(mut self) -> Self {
        self.skipped += 1;
        self
    }

    pub fn merge(mut self, other: GridAccumulator) -> Self {
        self.best = self.best.merge(other.best);
        self.failures.extend(other.failures);
        self.evaluated += other.evaluated;
        self.undefined += other.undefined;
        self.skipped += other.skipped;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_key_total_order() {
        assert!(RateKey(0.0) < RateKey(0.01));
        assert_eq!(RateKey(0.02), RateKey(0.02));
        assert_ne!(RateKey(0.0), RateKey(-0.0));
    }
}
