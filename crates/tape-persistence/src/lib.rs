//! Append-only CSV record logs for bybit-tape.
//!
//! One log file per record kind, created with its header row on first use
//! and appended to on every later run.

pub mod error;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::{append, ensure_log, CsvLog, LogTarget, RecordWriter};
