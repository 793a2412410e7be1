//! Stock movement models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a stored enum label is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Which way a movement moves stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementDirection {
    In,
    Out,
    /// Recorded without a net register change (transfers)
    Neutral,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "IN",
            MovementDirection::Out => "OUT",
            MovementDirection::Neutral => "NEUTRAL",
        }
    }

    /// Direction implied by a signed quantity
    pub fn from_signed(signed_quantity: i64) -> Self {
        match signed_quantity.signum() {
            1 => MovementDirection::In,
            -1 => MovementDirection::Out,
            _ => MovementDirection::Neutral,
        }
    }

    /// Signed register delta for a movement of `quantity` in this direction
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementDirection::In => quantity,
            MovementDirection::Out => quantity.saturating_neg(),
            MovementDirection::Neutral => 0,
        }
    }
}

impl fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementDirection::In),
            "OUT" => Ok(MovementDirection::Out),
            "NEUTRAL" => Ok(MovementDirection::Neutral),
            other => Err(UnknownVariant {
                kind: "movement direction",
                value: other.to_string(),
            }),
        }
    }
}

/// Why a movement happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
    Purchase,
    Adjustment,
    Sale,
    Return,
    Transfer,
    /// Opening balance written when a product is created
    Initial,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "PURCHASE",
            MovementReason::Adjustment => "ADJUSTMENT",
            MovementReason::Sale => "SALE",
            MovementReason::Return => "RETURN",
            MovementReason::Transfer => "TRANSFER",
            MovementReason::Initial => "INITIAL",
        }
    }
}

impl fmt::Display for MovementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASE" => Ok(MovementReason::Purchase),
            "ADJUSTMENT" => Ok(MovementReason::Adjustment),
            "SALE" => Ok(MovementReason::Sale),
            "RETURN" => Ok(MovementReason::Return),
            "TRANSFER" => Ok(MovementReason::Transfer),
            "INITIAL" => Ok(MovementReason::Initial),
            other => Err(UnknownVariant {
                kind: "movement reason",
                value: other.to_string(),
            }),
        }
    }
}

/// An immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub company_id: Uuid,
    /// Position in the product's ledger, starting at 1
    pub sequence: i64,
    pub direction: MovementDirection,
    pub reason: MovementReason,
    /// Absolute magnitude, always > 0
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub notes: Option<String>,
    pub actor_id: String,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Signed change this entry claims to apply to the register
    pub fn signed_quantity(&self) -> i64 {
        self.direction.signed(self.quantity)
    }

    /// Whether the entry's own numbers add up
    ///
    /// Values out of arithmetic range count as inconsistent.
    pub fn is_self_consistent(&self) -> bool {
        let adds_up = self.previous_stock.checked_add(self.signed_quantity()) == Some(self.new_stock);
        let priced = self.unit_cost.checked_mul(Decimal::from(self.quantity)) == Some(self.total_cost);

        self.quantity > 0 && self.previous_stock >= 0 && self.new_stock >= 0 && adds_up && priced
    }
}
