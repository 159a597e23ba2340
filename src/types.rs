//! Domain primitives shared across the matching and settlement core.
//!
//! Money is always an integer number of minor units (100 minor units per
//! contract face value); binary-contract prices are integers in `1..=99`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic order identifier, assigned by the orchestrator on acceptance.
pub type OrderId = u64;

/// Identifies a market. Opaque to the core beyond equality/hashing.
pub type MarketId = String;

/// Identifies a user. Opaque to the core beyond equality/hashing.
pub type UserId = String;

/// Integer monetary quantity, minor units (two implied decimals).
pub type MinorUnits = i64;

/// Which side of the book an order rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Which of the two complementary outcomes an order targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(self) -> Outcome {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YES" => Ok(Outcome::Yes),
            "NO" => Ok(Outcome::No),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// A live or resting limit order.
///
/// Mutated only by the matching engine: `quantity` decreases as it fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub side: Side,
    pub outcome: Outcome,
    pub price: u8,
    pub quantity: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub accept_time: chrono::DateTime<chrono::Utc>,
}

/// Result of a single crossing between a resting (maker) and incoming (taker) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub price: u8,
    pub quantity: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_is_involutive() {
        assert_eq!(Side::Buy.opposite().opposite(), Side::Buy);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn outcome_opposite_is_involutive() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite().opposite(), Outcome::No);
    }

    #[test]
    fn side_display_matches_wire_format() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Outcome::Yes.to_string(), "YES");
    }

    #[test]
    fn side_and_outcome_round_trip_through_display_and_from_str() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(side.to_string().parse::<Side>().unwrap(), side);
        }
        for outcome in [Outcome::Yes, Outcome::No] {
            assert_eq!(outcome.to_string().parse::<Outcome>().unwrap(), outcome);
        }
    }
}
