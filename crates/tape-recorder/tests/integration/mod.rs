//! Integration tests for tape-recorder.
//!
//! These tests run the recorder against an in-process WebSocket server:
//! - Subscribe and heartbeat traffic
//! - Frames flowing into the CSV logs
//! - Reconnects and the restart bound

pub mod common;
