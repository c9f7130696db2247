//! Normalized records appended to the per-topic logs.
//!
//! Sizes and prices are kept as the exact decimal strings received from
//! the exchange so that rows are bit-exact with the upstream payload.

use crate::Side;
use serde::{Deserialize, Serialize};

/// A record kind that can be rendered as one CSV row.
pub trait CsvRecord {
    /// Header row written once when the log file is created.
    const HEADER: &'static str;

    /// File name of the log holding this record kind.
    const FILE_NAME: &'static str;

    /// Render the record as a CSV row (no trailing newline).
    fn csv_line(&self) -> String;
}

/// One public trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp_ms: i64,
    pub side: Side,
    pub size: String,
    pub price: String,
    pub is_block_trade: bool,
}

impl CsvRecord for TradeRecord {
    const HEADER: &'static str = "timestamp,direction,size,price,blocktrade";
    const FILE_NAME: &'static str = "trade.csv";

    fn csv_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp_ms, self.side, self.size, self.price, self.is_block_trade
        )
    }
}

/// One liquidation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub timestamp_ms: i64,
    pub side: Side,
    pub size: String,
    pub price: String,
}

impl CsvRecord for LiquidationRecord {
    const HEADER: &'static str = "timestamp,direction,size,price";
    const FILE_NAME: &'static str = "liquidation.csv";

    fn csv_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.timestamp_ms, self.side, self.size, self.price
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_csv_line() {
        let trade = TradeRecord {
            timestamp_ms: 1000,
            side: Side::Buy,
            size: "0.5".to_string(),
            price: "65000".to_string(),
            is_block_trade: false,
        };
        assert_eq!(trade.csv_line(), "1000,Buy,0.5,65000,false");
    }

    #[test]
    fn test_liquidation_csv_line() {
        let liq = LiquidationRecord {
            timestamp_ms: 2000,
            side: Side::Sell,
            size: "1.2".to_string(),
            price: "64000".to_string(),
        };
        assert_eq!(liq.csv_line(), "2000,Sell,1.2,64000");
    }

    #[test]
    fn test_decimal_strings_kept_verbatim() {
        let trade = TradeRecord {
            timestamp_ms: 1,
            side: Side::Sell,
            size: "0.010".to_string(),
            price: "65000.50".to_string(),
            is_block_trade: true,
        };
        assert_eq!(trade.csv_line(), "1,Sell,0.010,65000.50,true");
    }

    #[test]
    fn test_headers_match_column_count() {
        assert_eq!(TradeRecord::HEADER.split(',').count(), 5);
        assert_eq!(LiquidationRecord::HEADER.split(',').count(), 4);
    }
}
