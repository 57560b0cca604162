use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Coin, Fill, HeldPosition, Position};
use crate::error::{LedgerError, Result};

/// Relational store holding the coin snapshot and the portfolio ledger.
///
/// Implementations must apply `accumulate_position` as a single atomic
/// upsert that adds to existing quantity and paid and leaves `gain_pct`
/// untouched, so concurrent buys of the same coin never lose an update.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert or overwrite every non-key column of each coin
    async fn upsert_coins(&self, coins: &[Coin]) -> Result<()>;

    /// Create the position on first buy, otherwise add to it. Returns the stored row.
    async fn accumulate_position(&self, fill: &Fill) -> Result<Position>;

    async fn get_position(&self, coin_id: &str) -> Result<Option<Position>>;

    /// Positions ordered by row id, joined with their coin's snapshot price
    async fn held_positions(&self, limit: i64, offset: i64) -> Result<Vec<HeldPosition>>;

    /// Overwrite the derived gain of a position
    async fn set_gain(&self, coin_id: &str, gain_pct: Decimal) -> Result<()>;
}

/// Reject fills that would break `quantity == 0 <=> paid == 0`
pub fn validate_fill(fill: &Fill) -> Result<()> {
    if fill.coin_id.trim().is_empty() {
        return Err(LedgerError::Validation("fill has an empty coin id".to_string()));
    }
    if fill.quantity <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "fill quantity must be positive for {}, got {}",
            fill.coin_id, fill.quantity
        )));
    }
    if fill.amount_paid <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "fill amount must be positive for {}, got {}",
            fill.coin_id, fill.amount_paid
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_fill() {
        assert!(validate_fill(&Fill::new("bitcoin", dec!(1), dec!(150))).is_ok());
        assert!(validate_fill(&Fill::new("bitcoin", dec!(0), dec!(150))).is_err());
        assert!(validate_fill(&Fill::new("bitcoin", dec!(1), dec!(0))).is_err());
        assert!(validate_fill(&Fill::new("bitcoin", dec!(-1), dec!(-150))).is_err());
        assert!(validate_fill(&Fill::new(" ", dec!(1), dec!(1))).is_err());
    }
}
