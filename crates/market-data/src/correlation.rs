use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use insights_core::{InsightsResult, PricePanel};
use quant_analysis::simple_returns;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::esg::EsgLookup;
use crate::sentiment::{DailySentiment, SentimentFeed};

/// Pearson correlation of two equal-length series. `None` when there are
/// fewer than two points or either series has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mean_x = x.mean();
    let mean_y = y.mean();

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaggedCorrelation {
    pub by_lag: BTreeMap<usize, f64>,
    pub optimal_lag: Option<usize>,
    pub optimal_correlation: Option<f64>,
}

/// Correlates `sentiment[..n - lag]` with `prices[lag..]` for every lag in
/// `0..=max_lag`. Lags without a defined correlation are left out; the
/// optimal lag is the highest correlation, smallest lag on ties.
pub fn lagged_correlation(sentiment: &[f64], prices: &[f64], max_lag: usize) -> LaggedCorrelation {
    let n = sentiment.len().min(prices.len());
    let mut by_lag = BTreeMap::new();
    for lag in 0..=max_lag.min(n) {
        if let Some(r) = pearson(&sentiment[..n - lag], &prices[lag..n]) {
            by_lag.insert(lag, r);
        }
    }

    let mut optimal: Option<(usize, f64)> = None;
    for (&lag, &r) in &by_lag {
        if optimal.map_or(true, |(_, best)| r > best) {
            optimal = Some((lag, r));
        }
    }

    LaggedCorrelation {
        by_lag,
        optimal_lag: optimal.map(|(lag, _)| lag),
        optimal_correlation: optimal.map(|(_, r)| r),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedClose {
    pub date: NaiveDate,
    pub close: f64,
}

/// Sentiment and price view of one ticker over the days it was in the news
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentAnalysis {
    pub ticker: String,
    pub sentiment: Vec<DailySentiment>,
    pub closes: Vec<DatedClose>,
    pub correlation: Option<f64>,
    pub lagged: LaggedCorrelation,
    /// Sample standard deviation of close-to-close returns across news days.
    pub volatility: Option<f64>,
}

pub fn analyze_sentiment(
    feed: &SentimentFeed,
    panel: &PricePanel,
    ticker: &str,
    max_lag: usize,
) -> InsightsResult<SentimentAnalysis> {
    let sentiment = feed.daily_sentiment(ticker)?;
    let news_days: BTreeSet<NaiveDate> = sentiment.iter().map(|s| s.date).collect();

    let closes: Vec<DatedClose> = panel
        .closes_for(ticker)
        .into_iter()
        .filter(|(date, _)| news_days.contains(date))
        .map(|(date, close)| DatedClose { date, close })
        .collect();

    // Both series are date-ordered, so walking the sentiment days keeps the
    // aligned pairs sorted.
    let close_by_date: BTreeMap<NaiveDate, f64> =
        closes.iter().map(|c| (c.date, c.close)).collect();
    let (scores, prices): (Vec<f64>, Vec<f64>) = sentiment
        .iter()
        .filter_map(|s| close_by_date.get(&s.date).map(|close| (s.score, *close)))
        .unzip();

    let returns = simple_returns(&closes.iter().map(|c| c.close).collect::<Vec<_>>());
    let volatility = if returns.len() < 2 {
        None
    } else {
        Some(returns.iter().std_dev()).filter(|v| v.is_finite())
    };

    tracing::info!(
        "Sentiment analysis for {}: {} news days, {} aligned closes",
        ticker,
        sentiment.len(),
        prices.len()
    );

    Ok(SentimentAnalysis {
        ticker: ticker.to_string(),
        correlation: pearson(&scores, &prices),
        lagged: lagged_correlation(&scores, &prices, max_lag),
        sentiment,
        closes,
        volatility,
    })
}

/// Mean close per symbol per calendar year.
pub fn yearly_mean_closes(panel: &PricePanel) -> BTreeMap<String, BTreeMap<i32, f64>> {
    let mut sums: BTreeMap<String, BTreeMap<i32, (f64, usize)>> = BTreeMap::new();
    for record in panel.records() {
        let entry = sums
            .entry(record.symbol.clone())
            .or_default()
            .entry(record.date.year())
            .or_insert((0.0, 0));
        entry.0 += record.close;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(symbol, years)| {
            let means = years
                .into_iter()
                .map(|(year, (sum, count))| (year, sum / count as f64))
                .collect();
            (symbol, means)
        })
        .collect()
}

/// Per symbol, correlates the ESG score of year `y` with the mean close of
/// year `y + lag`. Fewer than two paired years gives `None`; a degenerate
/// series with no variance gives `Some(0.0)`.
pub fn esg_price_correlation(
    ratings: &impl EsgLookup,
    yearly_closes: &BTreeMap<String, BTreeMap<i32, f64>>,
    lag: i32,
) -> BTreeMap<String, Option<f64>> {
    let mut out = BTreeMap::new();
    for symbol in ratings.symbols() {
        let closes = match yearly_closes.get(&symbol) {
            Some(closes) => closes,
            None => continue,
        };
        let mut scores = Vec::new();
        let mut prices = Vec::new();
        for year in ratings.years(&symbol) {
            if let (Some(rating), Some(close)) =
                (ratings.rating(&symbol, year), closes.get(&(year + lag)))
            {
                scores.push(f64::from(rating.score()));
                prices.push(*close);
            }
        }
        let correlation = if scores.len() < 2 {
            None
        } else {
            Some(pearson(&scores, &prices).unwrap_or(0.0))
        };
        out.insert(symbol, correlation);
    }
    out
}
