//! Trade side as reported by the exchange.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a trade or liquidation: `"Buy"` or `"Sell"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation, also used in the CSV `direction` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serde_matches_wire() {
        let side: Side = serde_json::from_str("\"Sell\"").unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"Buy\"");
        assert!(serde_json::from_str::<Side>("\"buy\"").is_err());
        assert_eq!(Side::Sell.to_string(), "Sell");
    }
}
