//! Payload parsing for trade and liquidation frames.
//!
//! Field mapping follows the Bybit v5 public stream:
//! - trade entry: `{"T": ms, "S": "Buy"|"Sell", "v": size, "p": price, "BT": bool}`
//! - liquidation: `{"updatedTime": ms, "side": ..., "size": ..., "price": ...}`
//!
//! Size and price are copied as strings, never re-formatted.

use crate::error::{FeedError, FeedResult};
use serde::Deserialize;
use serde_json::Value;
use tape_core::{LiquidationRecord, Side, TradeRecord};
use tape_ws::FeedEvent;
use tracing::debug;

/// Raw public trade entry.
#[derive(Debug, Deserialize)]
pub struct RawTrade {
    /// Fill time (ms).
    #[serde(rename = "T")]
    pub timestamp_ms: i64,
    /// Taker side.
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "v")]
    pub size: String,
    #[serde(rename = "p")]
    pub price: String,
    /// Block trade flag. Older payloads omit it.
    #[serde(rename = "BT", default)]
    pub is_block_trade: bool,
}

/// Raw liquidation payload.
#[derive(Debug, Deserialize)]
pub struct RawLiquidation {
    #[serde(rename = "updatedTime")]
    pub updated_time: i64,
    pub side: Side,
    pub size: String,
    pub price: String,
}

/// Decoded form of a [`FeedEvent`].
#[derive(Debug)]
pub enum DecodedEvent {
    /// One result per trade entry, in frame order.
    Trades(Vec<FeedResult<TradeRecord>>),
    Liquidation(FeedResult<LiquidationRecord>),
}

/// Decode one trade entry.
pub fn decode_trade(entry: &Value) -> FeedResult<TradeRecord> {
    let raw = RawTrade::deserialize(entry).map_err(|source| FeedError::InvalidPayload {
        kind: "trade",
        source,
    })?;
    check_decimal("size", &raw.size)?;
    check_decimal("price", &raw.price)?;

    Ok(TradeRecord {
        timestamp_ms: raw.timestamp_ms,
        side: raw.side,
        size: raw.size,
        price: raw.price,
        is_block_trade: raw.is_block_trade,
    })
}

/// Decode every entry of a trade batch independently.
pub fn decode_trades(entries: &[Value]) -> Vec<FeedResult<TradeRecord>> {
    entries.iter().map(decode_trade).collect()
}

/// Decode a liquidation payload.
pub fn decode_liquidation(data: &Value) -> FeedResult<LiquidationRecord> {
    let raw =
        RawLiquidation::deserialize(data).map_err(|source| FeedError::InvalidPayload {
            kind: "liquidation",
            source,
        })?;
    check_decimal("size", &raw.size)?;
    check_decimal("price", &raw.price)?;

    Ok(LiquidationRecord {
        timestamp_ms: raw.updated_time,
        side: raw.side,
        size: raw.size,
        price: raw.price,
    })
}

pub fn decode_event(event: &FeedEvent) -> DecodedEvent {
    match event {
        FeedEvent::Trades(entries) => {
            debug!(count = entries.len(), "Decoding trade batch");
            DecodedEvent::Trades(decode_trades(entries))
        }
        FeedEvent::Liquidation(data) => DecodedEvent::Liquidation(decode_liquidation(data)),
    }
}

/// Rejects values that would corrupt a CSV row.
fn check_decimal(field: &str, value: &str) -> FeedResult<()> {
    if value.is_empty() || value.contains([',', '\n', '\r']) {
        return Err(FeedError::InvalidData(format!(
            "{field} is not a decimal string: {value:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_trade() {
        let entry = json!({"T": 1000, "S": "Buy", "v": "0.5", "p": "65000", "BT": false});
        let trade = decode_trade(&entry).unwrap();

        assert_eq!(
            trade,
            TradeRecord {
                timestamp_ms: 1000,
                side: Side::Buy,
                size: "0.5".to_string(),
                price: "65000".to_string(),
                is_block_trade: false,
            }
        );
    }

    #[test]
    fn test_decode_trade_keeps_decimal_strings_verbatim() {
        let entry = json!({"T": 1, "S": "Sell", "v": "0.00100", "p": "65000.10", "BT": true});
        let trade = decode_trade(&entry).unwrap();

        assert_eq!(trade.size, "0.00100");
        assert_eq!(trade.price, "65000.10");
        assert!(trade.is_block_trade);
    }

    #[test]
    fn test_decode_trade_missing_block_flag_defaults_false() {
        let entry = json!({"T": 1, "S": "Buy", "v": "1", "p": "2"});
        assert!(!decode_trade(&entry).unwrap().is_block_trade);
    }

    #[test]
    fn test_decode_trade_ignores_extra_fields() {
        let entry = json!({
            "T": 1, "s": "BTCUSDT", "S": "Buy", "v": "1", "p": "2",
            "L": "PlusTick", "i": "abc", "BT": false
        });
        assert!(decode_trade(&entry).is_ok());
    }

    #[test]
    fn test_decode_trade_rejects_bad_entries() {
        let cases = [
            json!({"S": "Buy", "v": "1", "p": "2"}),
            json!({"T": 1, "S": "buy", "v": "1", "p": "2"}),
            json!({"T": 1, "S": "Buy", "v": 1.0, "p": "2"}),
            json!({"T": 1, "S": "Buy", "v": "", "p": "2"}),
            json!({"T": 1, "S": "Buy", "v": "1", "p": "2,5"}),
            json!("not an object"),
        ];
        for entry in &cases {
            assert!(decode_trade(entry).is_err(), "accepted {entry}");
        }
    }

    #[test]
    fn test_decode_trades_isolates_bad_entry() {
        let entries = vec![
            json!({"T": 1, "S": "Buy", "v": "1", "p": "100"}),
            json!({"T": 2, "S": "Hold", "v": "1", "p": "100"}),
            json!({"T": 3, "S": "Sell", "v": "2", "p": "101"}),
        ];
        let results = decode_trades(&entries);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().timestamp_ms, 1);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().timestamp_ms, 3);
    }

    #[test]
    fn test_decode_liquidation() {
        let data = json!({"updatedTime": 2000, "symbol": "BTCUSDT", "side": "Sell", "size": "1.2", "price": "64000"});
        let liq = decode_liquidation(&data).unwrap();

        assert_eq!(
            liq,
            LiquidationRecord {
                timestamp_ms: 2000,
                side: Side::Sell,
                size: "1.2".to_string(),
                price: "64000".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_liquidation_missing_field() {
        let data = json!({"updatedTime": 2000, "side": "Sell", "size": "1.2"});
        assert!(matches!(
            decode_liquidation(&data),
            Err(FeedError::InvalidPayload { kind: "liquidation", .. })
        ));
    }

    #[test]
    fn test_decode_event() {
        let event = FeedEvent::Trades(vec![
            json!({"T": 1, "S": "Buy", "v": "1", "p": "2"}),
            json!({"T": 2, "S": "Sell", "v": "3", "p": "4"}),
        ]);
        match decode_event(&event) {
            DecodedEvent::Trades(results) => {
                let ts: Vec<i64> = results.into_iter().map(|r| r.unwrap().timestamp_ms).collect();
                assert_eq!(ts, vec![1, 2]);
            }
            other => panic!("Expected trades, got {other:?}"),
        }

        let event = FeedEvent::Liquidation(json!({"updatedTime": 5, "side": "Buy", "size": "1", "price": "2"}));
        assert!(matches!(
            decode_event(&event),
            DecodedEvent::Liquidation(Ok(LiquidationRecord { timestamp_ms: 5, .. }))
        ));
    }
}
