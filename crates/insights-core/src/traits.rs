use crate::error::InsightsResult;
use crate::panel::{FundamentalsPanel, PricePanel};

/// Source of the price history snapshot. Loading is a single blocking call
/// made before any computation starts.
pub trait PriceHistoryProvider {
    fn load(&self) -> InsightsResult<PricePanel>;
}

/// Source of the fundamentals table joined onto the price history.
pub trait FundamentalsProvider {
    fn load(&self) -> InsightsResult<FundamentalsPanel>;
}

impl PriceHistoryProvider for PricePanel {
    fn load(&self) -> InsightsResult<PricePanel> {
        Ok(self.clone())
    }
}

impl FundamentalsProvider for FundamentalsPanel {
    fn load(&self) -> InsightsResult<FundamentalsPanel> {
        Ok(self.clone())
    }
}
