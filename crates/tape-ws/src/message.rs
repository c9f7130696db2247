//! WebSocket message types and frame classification.
//!
//! Outbound: subscribe and ping control requests.
//! Inbound: every text frame is classified as a trade batch, a liquidation
//! event or a control response (subscribe ack, pong). Anything else is a
//! [`DecodeError`].

use crate::error::{DecodeError, WsResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request id carried by the subscribe request.
pub const SUBSCRIBE_REQ_ID: &str = "subs";

/// Fixed request id carried by every heartbeat ping.
pub const PING_REQ_ID: &str = "100001";

// ============================================================================
// Topics
// ============================================================================

/// Topic names the recorder subscribes to and routes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topics {
    /// Public trade topic (e.g., "publicTrade.BTCUSDT").
    pub trade: String,
    /// Liquidation topic (e.g., "liquidation.BTCUSDT").
    pub liquidation: String,
}

impl Topics {
    pub fn for_symbol(symbol: &str) -> Self {
        Self {
            trade: format!("publicTrade.{symbol}"),
            liquidation: format!("liquidation.{symbol}"),
        }
    }

    /// Subscribe arguments, trade topic first.
    pub fn all(&self) -> Vec<String> {
        vec![self.trade.clone(), self.liquidation.clone()]
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::for_symbol("BTCUSDT")
    }
}

// ============================================================================
// Control Request (Outgoing)
// ============================================================================

/// Outgoing control request.
///
/// Serializes as `{"req_id": ..., "op": ..., "args": [...]}`; `args` is
/// omitted when empty (ping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRequest {
    pub req_id: String,
    pub op: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ControlRequest {
    /// Create a subscribe request for the given topics.
    pub fn subscribe(topics: Vec<String>) -> Self {
        Self {
            req_id: SUBSCRIBE_REQ_ID.to_string(),
            op: "subscribe".to_string(),
            args: topics,
        }
    }

    /// Create a heartbeat ping.
    pub fn ping() -> Self {
        Self {
            req_id: PING_REQ_ID.to_string(),
            op: "ping".to_string(),
            args: Vec::new(),
        }
    }

    pub fn to_text(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Inbound frames
// ============================================================================

/// Acknowledgement of a control request (subscribe ack or pong).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub success: bool,
    pub request_id: String,
    pub op: Option<String>,
    pub ret_msg: Option<String>,
    pub conn_id: Option<String>,
}

impl ControlResponse {
    /// Whether this answers a heartbeat ping.
    ///
    /// Linear streams echo `"op": "ping"` with `"ret_msg": "pong"`; other
    /// stream families answer with `"op": "pong"`.
    pub fn is_pong(&self) -> bool {
        matches!(self.op.as_deref(), Some("ping") | Some("pong"))
            || self.ret_msg.as_deref() == Some("pong")
    }

    pub fn is_subscribe_ack(&self) -> bool {
        self.op.as_deref() == Some("subscribe")
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedMessage {
    /// Trade topic frame; one element per trade, each decoded on its own.
    TradeBatch(Vec<Value>),
    /// Liquidation topic frame (the `data` object).
    LiquidationEvent(Value),
    /// Control response.
    ControlResponse(ControlResponse),
}

/// Data payload forwarded from the supervisor to the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Trades(Vec<Value>),
    Liquidation(Value),
}

/// Envelope fields used for routing. Everything else is ignored.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ret_msg: Option<String>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    req_id: Option<String>,
    #[serde(default)]
    conn_id: Option<String>,
}

/// Routes raw frames by topic, falling back to the control-response shape.
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    topics: Topics,
}

impl MessageClassifier {
    pub fn new(topics: Topics) -> Self {
        Self { topics }
    }

    /// Classify one raw text frame.
    pub fn classify(&self, raw: &str) -> Result<ClassifiedMessage, DecodeError> {
        let frame: RawFrame = serde_json::from_str(raw)?;

        if let Some(topic) = frame.topic.as_deref() {
            if topic == self.topics.trade {
                return match frame.data {
                    Some(Value::Array(entries)) => Ok(ClassifiedMessage::TradeBatch(entries)),
                    _ => Err(DecodeError::InvalidShape {
                        topic: topic.to_string(),
                        reason: "trade data is not an array",
                    }),
                };
            }

            if topic == self.topics.liquidation {
                return match frame.data {
                    Some(data @ Value::Object(_)) => Ok(ClassifiedMessage::LiquidationEvent(data)),
                    _ => Err(DecodeError::InvalidShape {
                        topic: topic.to_string(),
                        reason: "liquidation data is not an object",
                    }),
                };
            }
        }

        if frame.success.is_some() || frame.ret_msg.is_some() || frame.op.is_some() {
            return Ok(ClassifiedMessage::ControlResponse(ControlResponse {
                // A response without the flag still proves the peer answered.
                success: frame.success.unwrap_or(true),
                request_id: frame.req_id.unwrap_or_default(),
                op: frame.op,
                ret_msg: frame.ret_msg,
                conn_id: frame.conn_id,
            }));
        }

        Err(DecodeError::Unrecognized { topic: frame.topic })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> MessageClassifier {
        MessageClassifier::new(Topics::for_symbol("BTCUSDT"))
    }

    // ========================================================================
    // ControlRequest serialization tests
    // ========================================================================

    #[test]
    fn test_subscribe_request_wire_format() {
        let req = ControlRequest::subscribe(Topics::for_symbol("BTCUSDT").all());
        assert_eq!(
            req.to_text().unwrap(),
            r#"{"req_id":"subs","op":"subscribe","args":["publicTrade.BTCUSDT","liquidation.BTCUSDT"]}"#
        );
    }

    #[test]
    fn test_ping_request_wire_format() {
        assert_eq!(
            ControlRequest::ping().to_text().unwrap(),
            r#"{"req_id":"100001","op":"ping"}"#
        );
    }

    // ========================================================================
    // Classification tests
    // ========================================================================

    #[test]
    fn test_classify_trade_batch() {
        let raw = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1,"data":[{"T":1000,"S":"Buy","v":"0.5","p":"65000","BT":false}]}"#;

        match classifier().classify(raw).unwrap() {
            ClassifiedMessage::TradeBatch(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0]["p"], json!("65000"));
            }
            other => panic!("Expected TradeBatch, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_empty_trade_batch() {
        let raw = r#"{"topic":"publicTrade.BTCUSDT","data":[]}"#;
        assert_eq!(
            classifier().classify(raw).unwrap(),
            ClassifiedMessage::TradeBatch(vec![])
        );
    }

    #[test]
    fn test_classify_liquidation() {
        let raw = r#"{"topic":"liquidation.BTCUSDT","data":{"updatedTime":2000,"side":"Sell","size":"1.2","price":"64000"}}"#;

        match classifier().classify(raw).unwrap() {
            ClassifiedMessage::LiquidationEvent(data) => {
                assert_eq!(data["updatedTime"], json!(2000));
            }
            other => panic!("Expected LiquidationEvent, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_pong() {
        let raw = r#"{"success":true,"ret_msg":"pong","conn_id":"abc","req_id":"100001","op":"ping"}"#;

        match classifier().classify(raw).unwrap() {
            ClassifiedMessage::ControlResponse(resp) => {
                assert!(resp.success);
                assert!(resp.is_pong());
                assert!(!resp.is_subscribe_ack());
                assert_eq!(resp.request_id, PING_REQ_ID);
                assert_eq!(resp.conn_id.as_deref(), Some("abc"));
            }
            other => panic!("Expected ControlResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_subscribe_ack() {
        let raw = r#"{"success":true,"ret_msg":"","conn_id":"abc","req_id":"subs","op":"subscribe"}"#;

        match classifier().classify(raw).unwrap() {
            ClassifiedMessage::ControlResponse(resp) => {
                assert!(resp.is_subscribe_ack());
                assert!(!resp.is_pong());
                assert_eq!(resp.request_id, "subs");
            }
            other => panic!("Expected ControlResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_failed_control_response() {
        let raw = r#"{"success":false,"ret_msg":"error:handler not found","op":"subscribe"}"#;

        match classifier().classify(raw).unwrap() {
            ClassifiedMessage::ControlResponse(resp) => {
                assert!(!resp.success);
                assert_eq!(resp.request_id, "");
            }
            other => panic!("Expected ControlResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_pong_without_success_flag() {
        let raw = r#"{"req_id":"100001","op":"pong","args":["1672916271846"]}"#;

        match classifier().classify(raw).unwrap() {
            ClassifiedMessage::ControlResponse(resp) => {
                assert!(resp.is_pong());
                assert!(resp.success);
            }
            other => panic!("Expected ControlResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_unknown_topic() {
        let err = classifier()
            .classify(r#"{"topic":"foo","data":{}}"#)
            .unwrap_err();
        assert!(
            matches!(err, DecodeError::Unrecognized { topic: Some(ref t) } if t == "foo"),
            "got {err:?}"
        );
    }

    #[test]
    fn test_classify_other_symbol_is_unrecognized() {
        let err = classifier()
            .classify(r#"{"topic":"publicTrade.ETHUSDT","data":[]}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unrecognized { .. }));
    }

    #[test]
    fn test_classify_malformed() {
        assert!(matches!(
            classifier().classify("not json").unwrap_err(),
            DecodeError::Malformed(_)
        ));
        assert!(matches!(
            classifier().classify("[1,2,3]").unwrap_err(),
            DecodeError::Malformed(_)
        ));
    }

    #[test]
    fn test_classify_wrong_data_shape() {
        let err = classifier()
            .classify(r#"{"topic":"publicTrade.BTCUSDT","data":{"T":1}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidShape { .. }));

        let err = classifier()
            .classify(r#"{"topic":"liquidation.BTCUSDT","data":[]}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidShape { .. }));
    }
}
