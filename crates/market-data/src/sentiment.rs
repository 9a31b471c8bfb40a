use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use insights_core::{InsightsError, InsightsResult};
use serde::{Deserialize, Serialize};

const PUBLISHED_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bearish,
    #[serde(rename = "Somewhat-Bearish")]
    SomewhatBearish,
    Neutral,
    #[serde(rename = "Somewhat-Bullish")]
    SomewhatBullish,
    Bullish,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Bearish => "Bearish",
            SentimentLabel::SomewhatBearish => "Somewhat-Bearish",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::SomewhatBullish => "Somewhat-Bullish",
            SentimentLabel::Bullish => "Bullish",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buckets: `<= -0.35`, `(-0.35, -0.15]`, `(-0.15, 0.15)`, `[0.15, 0.35)`, `>= 0.35`.
pub fn sentiment_label(score: f64) -> SentimentLabel {
    if score <= -0.35 {
        SentimentLabel::Bearish
    } else if score <= -0.15 {
        SentimentLabel::SomewhatBearish
    } else if score < 0.15 {
        SentimentLabel::Neutral
    } else if score < 0.35 {
        SentimentLabel::SomewhatBullish
    } else {
        SentimentLabel::Bullish
    }
}

/// Scores arrive as strings in some feeds and as numbers in others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Number(f64),
    Text(String),
}

impl ScoreValue {
    fn value(&self) -> Option<f64> {
        let parsed = match self {
            ScoreValue::Number(v) => Some(*v),
            ScoreValue::Text(s) => s.trim().parse::<f64>().ok(),
        };
        parsed.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TickerSentiment {
    ticker: String,
    ticker_sentiment_score: ScoreValue,
}

#[derive(Debug, Clone, Deserialize)]
struct FeedItem {
    time_published: String,
    #[serde(default)]
    ticker_sentiment: Vec<TickerSentiment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TickerFeed {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

/// Mean sentiment of one ticker on one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySentiment {
    pub date: NaiveDate,
    pub score: f64,
    pub label: SentimentLabel,
    pub mentions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSentimentSummary {
    pub ticker: String,
    pub mean_score: f64,
    pub label: SentimentLabel,
    pub mentions: usize,
}

/// News sentiment feed keyed by ticker: `{"response_dict": {TICKER: {"feed": [...]}}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentimentFeed {
    #[serde(default)]
    response_dict: BTreeMap<String, TickerFeed>,
}

impl SentimentFeed {
    pub fn from_json(json: &str) -> InsightsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> InsightsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            InsightsError::Data(format!("cannot read {}: {}", path.display(), e))
        })?;
        let feed = Self::from_json(&text)?;
        tracing::info!(
            "Loaded sentiment feed for {} tickers from {}",
            feed.response_dict.len(),
            path.display()
        );
        Ok(feed)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.response_dict.keys().map(String::as_str)
    }

    /// (publication date, score) for every mention of `ticker` in its own feed.
    fn mentions(&self, ticker: &str) -> InsightsResult<Vec<(NaiveDate, f64)>> {
        let feed = match self.response_dict.get(ticker) {
            Some(feed) => feed,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for item in &feed.feed {
            let published = NaiveDateTime::parse_from_str(&item.time_published, PUBLISHED_FORMAT)
                .map_err(|e| {
                    InsightsError::InvalidData(format!(
                        "bad time_published '{}': {}",
                        item.time_published, e
                    ))
                })?;
            for entry in item.ticker_sentiment.iter().filter(|s| s.ticker == ticker) {
                match entry.ticker_sentiment_score.value() {
                    Some(score) => out.push((published.date(), score)),
                    None => tracing::warn!("Skipping unparseable sentiment score for {}", ticker),
                }
            }
        }
        Ok(out)
    }

    /// Mean score per publication date, ascending by date.
    pub fn daily_sentiment(&self, ticker: &str) -> InsightsResult<Vec<DailySentiment>> {
        let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for (date, score) in self.mentions(ticker)? {
            by_date.entry(date).or_default().push(score);
        }
        Ok(by_date
            .into_iter()
            .map(|(date, scores)| {
                let score = scores.iter().sum::<f64>() / scores.len() as f64;
                DailySentiment {
                    date,
                    score,
                    label: sentiment_label(score),
                    mentions: scores.len(),
                }
            })
            .collect())
    }

    /// Mean over every mention, `None` when the ticker is never scored.
    pub fn ticker_summary(&self, ticker: &str) -> InsightsResult<Option<TickerSentimentSummary>> {
        let mentions = self.mentions(ticker)?;
        if mentions.is_empty() {
            return Ok(None);
        }
        let mean_score = mentions.iter().map(|(_, s)| s).sum::<f64>() / mentions.len() as f64;
        Ok(Some(TickerSentimentSummary {
            ticker: ticker.to_string(),
            mean_score,
            label: sentiment_label(mean_score),
            mentions: mentions.len(),
        }))
    }
}
