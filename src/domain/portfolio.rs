use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A portfolio ledger row aggregating every buy of one coin.
///
/// `quantity` and `paid` only ever grow under the buy-only strategy.
/// `gain_pct` is derived and overwritten by each recomputation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: Option<i64>,
    pub coin_id: String,
    pub quantity: Decimal,
    pub paid: Decimal,
    pub gain_pct: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Position created by the first buy of a coin
    pub fn opened(fill: &Fill) -> Self {
        Self {
            id: None,
            coin_id: fill.coin_id.clone(),
            quantity: fill.quantity,
            paid: fill.amount_paid,
            gain_pct: Decimal::ZERO,
            updated_at: Some(Utc::now()),
        }
    }

    /// `quantity == 0 <=> paid == 0`
    pub fn is_consistent(&self) -> bool {
        self.quantity.is_zero() == self.paid.is_zero()
    }

    /// Average cost per unit, if anything was bought
    pub fn average_cost(&self) -> Option<Decimal> {
        if self.quantity.is_zero() {
            None
        } else {
            self.paid.checked_div(self.quantity)
        }
    }
}

/// A confirmed buy waiting to be folded into the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub coin_id: String,
    pub quantity: Decimal,
    pub amount_paid: Decimal,
}

impl Fill {
    pub fn new(coin_id: impl Into<String>, quantity: Decimal, amount_paid: Decimal) -> Self {
        Self {
            coin_id: coin_id.into(),
            quantity,
            amount_paid,
        }
    }
}

/// A held position joined with the snapshot price of its coin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldPosition {
    pub position: Position,
    /// `None` when the referenced coin is missing from the snapshot
    pub current_price: Option<Decimal>,
}
