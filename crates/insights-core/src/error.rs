use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Forecast range error: target date {target} is not after the last available date {last}")]
    ForecastRange { last: NaiveDate, target: NaiveDate },

    #[error("Undefined ratio: {0}")]
    UndefinedRatio(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    Calculation(String),

    #[error("Data source error: {0}")]
    Data(String),
}

impl InsightsError {
    /// Errors caused by what the caller asked for (bad parameters, empty or
    /// too-short inputs) rather than by a failure inside the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InsightsError::InsufficientData(_)
                | InsightsError::ForecastRange { .. }
                | InsightsError::InvalidRequest(_)
                | InsightsError::InvalidData(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InsightsError::InsufficientData(_) => "insufficient_data",
            InsightsError::ForecastRange { .. } => "forecast_range",
            InsightsError::UndefinedRatio(_) => "undefined_ratio",
            InsightsError::InvalidRequest(_) => "invalid_request",
            InsightsError::InvalidData(_) => "invalid_data",
            InsightsError::Calculation(_) => "calculation",
            InsightsError::Data(_) => "data_source",
        }
    }
}

impl From<std::io::Error> for InsightsError {
    fn from(err: std::io::Error) -> Self {
        InsightsError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for InsightsError {
    fn from(err: serde_json::Error) -> Self {
        InsightsError::Data(format!("JSON: {err}"))
    }
}

pub type InsightsResult<T> = Result<T, InsightsError>;

/// Serializable form of an error, used wherever a failure is reported as
/// data instead of aborting (grid cells, CLI output).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub client_error: bool,
    pub message: String,
}

impl From<&InsightsError> for ErrorReport {
    fn from(err: &InsightsError) -> Self {
        Self {
            kind: err.kind(),
            client_error: err.is_client_error(),
            message: err.to_string(),
        }
    }
}
