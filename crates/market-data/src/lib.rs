//! File-backed data providers, news sentiment and ESG ratings.

pub mod correlation;
pub mod csv_provider;
pub mod esg;
pub mod sentiment;

pub use correlation::{
    analyze_sentiment, esg_price_correlation, lagged_correlation, pearson, yearly_mean_closes,
    DatedClose, LaggedCorrelation, SentimentAnalysis,
};
pub use csv_provider::{read_fundamentals, read_prices, CsvFundamentals, CsvPriceHistory};
pub use esg::{EsgLookup, EsgRating, EsgTable};
pub use sentiment::{
    sentiment_label, DailySentiment, SentimentFeed, SentimentLabel, TickerSentimentSummary,
};
