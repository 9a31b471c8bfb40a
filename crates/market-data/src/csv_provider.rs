use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use insights_core::{
    Fundamentals, FundamentalsPanel, FundamentalsProvider, FundamentalsRecord, InsightsError,
    InsightsResult, PriceHistoryProvider, PricePanel, PriceRecord,
};
use serde::Deserialize;

/// Daily price history exported with an unnamed leading date column:
/// `,open,high,low,close,volume,symbol`. A header named `date` also works.
#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(alias = "", alias = "index")]
    date: NaiveDate,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    high: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    low: Option<f64>,
    close: f64,
    volume: f64,
    symbol: String,
}

/// Fundamentals table: `date,symbol,EPS,PE,ROE,ROA,ROI`. Blank or
/// unparseable ratios are treated as missing.
#[derive(Debug, Deserialize)]
struct FundamentalsRow {
    date: NaiveDate,
    symbol: String,
    #[serde(rename = "EPS", default, deserialize_with = "csv::invalid_option")]
    eps: Option<f64>,
    #[serde(rename = "PE", default, deserialize_with = "csv::invalid_option")]
    pe: Option<f64>,
    #[serde(rename = "ROE", default, deserialize_with = "csv::invalid_option")]
    roe: Option<f64>,
    #[serde(rename = "ROA", default, deserialize_with = "csv::invalid_option")]
    roa: Option<f64>,
    #[serde(rename = "ROI", default, deserialize_with = "csv::invalid_option")]
    roi: Option<f64>,
}

fn csv_error(source: &str, e: csv::Error) -> InsightsError {
    InsightsError::Data(format!("{}: {}", source, e))
}

fn open(path: &Path) -> InsightsResult<File> {
    File::open(path)
        .map_err(|e| InsightsError::Data(format!("cannot open {}: {}", path.display(), e)))
}

pub fn read_prices<R: Read>(reader: R) -> InsightsResult<PricePanel> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in reader.deserialize::<PriceRow>() {
        let row = row.map_err(|e| csv_error("price history", e))?;
        records.push(PriceRecord {
            date: row.date,
            symbol: row.symbol.trim().to_uppercase(),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    tracing::debug!("Parsed {} price rows", records.len());
    PricePanel::new(records)
}

pub fn read_fundamentals<R: Read>(reader: R) -> InsightsResult<FundamentalsPanel> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in reader.deserialize::<FundamentalsRow>() {
        let row = row.map_err(|e| csv_error("fundamentals", e))?;
        records.push(FundamentalsRecord {
            date: row.date,
            symbol: row.symbol.trim().to_uppercase(),
            values: Fundamentals {
                eps: row.eps,
                pe: row.pe,
                roe: row.roe,
                roa: row.roa,
                roi: row.roi,
            },
        });
    }

    tracing::debug!("Parsed {} fundamentals rows", records.len());
    FundamentalsPanel::new(records)
}

/// Price history backed by a CSV file, read on every `load`.
#[derive(Debug, Clone)]
pub struct CsvPriceHistory {
    path: PathBuf,
}

impl CsvPriceHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PriceHistoryProvider for CsvPriceHistory {
    fn load(&self) -> InsightsResult<PricePanel> {
        let panel = read_prices(open(&self.path)?)?;
        tracing::info!(
            "Loaded {} price rows for {} symbols from {}",
            panel.len(),
            panel.symbols().len(),
            self.path.display()
        );
        Ok(panel)
    }
}

#[derive(Debug, Clone)]
pub struct CsvFundamentals {
    path: PathBuf,
}

impl CsvFundamentals {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FundamentalsProvider for CsvFundamentals {
    fn load(&self) -> InsightsResult<FundamentalsPanel> {
        let panel = read_fundamentals(open(&self.path)?)?;
        tracing::info!(
            "Loaded {} fundamentals rows from {}",
            panel.len(),
            self.path.display()
        );
        Ok(panel)
    }
}
