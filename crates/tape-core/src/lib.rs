//! Core record types for the bybit-tape recorder.
//!
//! This crate provides the value types shared across the workspace:
//! - `Side`: aggressor / liquidated side as reported upstream
//! - `TradeRecord`, `LiquidationRecord`: normalized rows for the CSV logs
//! - `CsvRecord`: header + row rendering for a record kind

pub mod record;
pub mod side;

pub use record::{CsvRecord, LiquidationRecord, TradeRecord};
pub use side::Side;
