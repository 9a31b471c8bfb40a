use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use insights_core::InsightsError;
use serde::{Deserialize, Serialize};

/// MSCI-style letter grade, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EsgRating {
    Ccc,
    B,
    Bb,
    Bbb,
    A,
    Aa,
    Aaa,
}

impl EsgRating {
    /// Ordinal score: CCC = 1 up to AAA = 7.
    pub fn score(&self) -> u8 {
        match self {
            EsgRating::Ccc => 1,
            EsgRating::B => 2,
            EsgRating::Bb => 3,
            EsgRating::Bbb => 4,
            EsgRating::A => 5,
            EsgRating::Aa => 6,
            EsgRating::Aaa => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EsgRating::Ccc => "CCC",
            EsgRating::B => "B",
            EsgRating::Bb => "BB",
            EsgRating::Bbb => "BBB",
            EsgRating::A => "A",
            EsgRating::Aa => "AA",
            EsgRating::Aaa => "AAA",
        }
    }
}

impl fmt::Display for EsgRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EsgRating {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CCC" => Ok(EsgRating::Ccc),
            "B" => Ok(EsgRating::B),
            "BB" => Ok(EsgRating::Bb),
            "BBB" => Ok(EsgRating::Bbb),
            "A" => Ok(EsgRating::A),
            "AA" => Ok(EsgRating::Aa),
            "AAA" => Ok(EsgRating::Aaa),
            other => Err(InsightsError::InvalidData(format!(
                "unknown ESG rating '{}'",
                other
            ))),
        }
    }
}

/// Source of yearly ESG ratings per symbol
pub trait EsgLookup {
    fn rating(&self, symbol: &str, year: i32) -> Option<EsgRating>;

    /// Years with a rating for `symbol`, ascending.
    fn years(&self, symbol: &str) -> Vec<i32>;

    fn symbols(&self) -> Vec<String>;
}

/// In-memory ratings table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EsgTable {
    ratings: BTreeMap<String, BTreeMap<i32, EsgRating>>,
}

impl EsgTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, year: i32, rating: EsgRating) {
        self.ratings.entry(symbol.into()).or_default().insert(year, rating);
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }
}

impl EsgLookup for EsgTable {
    fn rating(&self, symbol: &str, year: i32) -> Option<EsgRating> {
        self.ratings.get(symbol)?.get(&year).copied()
    }

    fn years(&self, symbol: &str) -> Vec<i32> {
        self.ratings
            .get(symbol)
            .map(|years| years.keys().copied().collect())
            .unwrap_or_default()
    }

    fn symbols(&self) -> Vec<String> {
        self.ratings.keys().cloned().collect()
    }
}
