use std::collections::HashMap;

use chrono::NaiveDate;
use insights_core::{Fundamentals, FundamentalsPanel, InsightsError, InsightsResult, PricePanel};
use statrs::statistics::Statistics;

/// One model row: features for (date, symbol) and the next-day close label.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub features: Vec<f64>,
    pub close: f64,
    pub label: f64,
}

/// Price panel left-joined with fundamentals, in panel record order.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<FeatureRow>,
    feature_names: Vec<&'static str>,
}

impl Dataset {
    /// Joins fundamentals onto every price row. Missing fundamentals take the
    /// column mean of the joined table; a column with no observations at all
    /// is filled with zero.
    ///
    /// Labels are the same symbol's next close. A symbol's final row has no
    /// successor and keeps the previous label, which is its own close.
    pub fn build(
        panel: &PricePanel,
        fundamentals: Option<&FundamentalsPanel>,
        include_close: bool,
    ) -> InsightsResult<Self> {
        if panel.is_empty() {
            return Err(InsightsError::InsufficientData(
                "cannot build a training set from an empty price panel".to_string(),
            ));
        }
        let records = panel.records();

        let joined: Vec<[Option<f64>; 5]> = records
            .iter()
            .map(|r| {
                fundamentals
                    .and_then(|f| f.get(r.date, &r.symbol))
                    .map(Fundamentals::as_array)
                    .unwrap_or([None; 5])
                    .map(|v| v.filter(|x| x.is_finite()))
            })
            .collect();

        let mut fill = [0.0; 5];
        for (col, name) in Fundamentals::FIELD_NAMES.iter().enumerate() {
            let observed: Vec<f64> = joined.iter().filter_map(|row| row[col]).collect();
            if observed.is_empty() {
                tracing::warn!("No observations for {} in the joined table, filling with 0", name);
            } else {
                fill[col] = observed.as_slice().mean();
            }
        }

        let mut labels: Vec<f64> = records.iter().map(|r| r.close).collect();
        let mut previous: HashMap<&str, usize> = HashMap::new();
        for (i, r) in records.iter().enumerate() {
            if let Some(prev) = previous.insert(r.symbol.as_str(), i) {
                labels[prev] = r.close;
            }
        }

        let rows = records
            .iter()
            .zip(joined)
            .zip(labels)
            .map(|((r, values), label)| {
                let mut features = Vec::with_capacity(7);
                features.push(r.volume);
                features.extend(values.iter().zip(fill).map(|(v, f)| v.unwrap_or(f)));
                if include_close {
                    features.push(r.close);
                }
                FeatureRow {
                    date: r.date,
                    symbol: r.symbol.clone(),
                    features,
                    close: r.close,
                    label,
                }
            })
            .collect();

        let mut feature_names = vec!["volume"];
        feature_names.extend(Fundamentals::FIELD_NAMES);
        if include_close {
            feature_names.push("close");
        }

        Ok(Self {
            rows,
            feature_names,
        })
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn feature_names(&self) -> &[&'static str] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn features(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.features.clone()).collect()
    }

    pub fn labels(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use insights_core::{FundamentalsRecord, PriceRecord};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn panel() -> PricePanel {
        PricePanel::new(vec![
            PriceRecord::new(d(1), "BP", 30.0, 100.0),
            PriceRecord::new(d(1), "GS", 400.0, 50.0),
            PriceRecord::new(d(4), "BP", 31.0, 110.0),
            PriceRecord::new(d(4), "GS", 405.0, 55.0),
            PriceRecord::new(d(5), "BP", 32.0, 120.0),
        ])
        .unwrap()
    }

    fn fundamentals() -> FundamentalsPanel {
        let f = |eps: Option<f64>| Fundamentals {
            eps,
            pe: Some(10.0),
            roe: Some(0.1),
            roa: None,
            roi: Some(0.2),
        };
        FundamentalsPanel::new(vec![
            FundamentalsRecord { date: d(1), symbol: "BP".into(), values: f(Some(2.0)) },
            FundamentalsRecord { date: d(4), symbol: "BP".into(), values: f(Some(4.0)) },
            FundamentalsRecord { date: d(1), symbol: "GS".into(), values: f(None) },
        ])
        .unwrap()
    }

    #[test]
    fn test_labels_are_next_close_per_symbol() {
        let ds = Dataset::build(&panel(), None, false).unwrap();
        let labels = ds.labels();
        // Record order: BP d1, GS d1, BP d4, GS d4, BP d5
        assert_eq!(labels, vec![31.0, 405.0, 32.0, 405.0, 32.0]);
    }

    #[test]
    fn test_missing_fundamentals_filled_with_column_mean() {
        let ds = Dataset::build(&panel(), Some(&fundamentals()), false).unwrap();
        assert_eq!(ds.feature_names(), &["volume", "EPS", "PE", "ROE", "ROA", "ROI"]);
        let rows = ds.rows();
        // EPS observed: 2.0, 4.0 -> mean 3.0
        assert_relative_eq!(rows[1].features[1], 3.0);
        assert_relative_eq!(rows[4].features[1], 3.0);
        // ROA never observed -> 0
        assert!(rows.iter().all(|r| r.features[4] == 0.0));
        assert!(rows.iter().all(|r| r.features.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_include_close_appends_feature() {
        let ds = Dataset::build(&panel(), None, true).unwrap();
        assert_eq!(ds.feature_names().last(), Some(&"close"));
        assert_eq!(ds.rows()[0].features.len(), 7);
        assert_eq!(ds.rows()[0].features[6], 30.0);
    }

    #[test]
    fn test_empty_panel_rejected() {
        assert!(Dataset::build(&PricePanel::default(), None, false).is_err());
    }
}
