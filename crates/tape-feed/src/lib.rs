//! Payload decoding for the bybit-tape recorder.
//!
//! Turns the raw `data` payloads forwarded by the supervisor into
//! normalized [`TradeRecord`](tape_core::TradeRecord) and
//! [`LiquidationRecord`](tape_core::LiquidationRecord) rows.

pub mod error;
pub mod parser;

pub use error::{FeedError, FeedResult};
pub use parser::{
    decode_event, decode_liquidation, decode_trade, decode_trades, DecodedEvent, RawLiquidation,
    RawTrade,
};
