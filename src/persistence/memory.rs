//! In-process ledger store.
//!
//! Mirrors the Postgres upsert semantics: coin upserts overwrite, position
//! upserts add. Per-key entry locking makes accumulation atomic.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};

use super::store::{validate_fill, LedgerStore};
use crate::domain::{Coin, Fill, HeldPosition, Position};
use crate::error::{LedgerError, Result};

#[derive(Default)]
pub struct MemoryStore {
    coins: DashMap<String, Coin>,
    positions: DashMap<String, Position>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a position row as-is, bypassing fill validation (fixtures and imports)
    pub fn seed_position(&self, mut position: Position) {
        if position.id.is_none() {
            position.id = Some(self.allocate_id());
        }
        self.positions.insert(position.coin_id.clone(), position);
    }

    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn upsert_coins(&self, coins: &[Coin]) -> Result<()> {
        for coin in coins {
            self.coins.insert(coin.coin_id.clone(), coin.clone());
        }
        Ok(())
    }

    async fn accumulate_position(&self, fill: &Fill) -> Result<Position> {
        validate_fill(fill)?;
        if !self.coins.contains_key(&fill.coin_id) {
            return Err(LedgerError::Validation(format!(
                "position references unknown coin {}",
                fill.coin_id
            )));
        }

        match self.positions.entry(fill.coin_id.clone()) {
            Entry::Vacant(vacant) => {
                let mut position = Position::opened(fill);
                position.id = Some(self.allocate_id());
                Ok(vacant.insert(position).value().clone())
            }
            Entry::Occupied(mut occupied) => {
                let position = occupied.get_mut();
                // Compute both sums before touching the row
                let quantity = position.quantity.checked_add(fill.quantity).ok_or_else(|| {
                    LedgerError::ArithmeticOverflow(format!("quantity of {}", fill.coin_id))
                })?;
                let paid = position.paid.checked_add(fill.amount_paid).ok_or_else(|| {
                    LedgerError::ArithmeticOverflow(format!("paid of {}", fill.coin_id))
                })?;
                position.quantity = quantity;
                position.paid = paid;
                position.updated_at = Some(Utc::now());
                Ok(position.clone())
            }
        }
    }

    async fn get_position(&self, coin_id: &str) -> Result<Option<Position>> {
        Ok(self.positions.get(coin_id).map(|p| p.clone()))
    }

    async fn held_positions(&self, limit: i64, offset: i64) -> Result<Vec<HeldPosition>> {
        let mut positions: Vec<Position> =
            self.positions.iter().map(|p| p.value().clone()).collect();
        positions.sort_by_key(|p| p.id);

        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);

        Ok(positions
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|position| {
                let current_price = self
                    .coins
                    .get(&position.coin_id)
                    .map(|c| c.current_price);
                HeldPosition {
                    position,
                    current_price,
                }
            })
            .collect())
    }

    async fn set_gain(&self, coin_id: &str, gain_pct: Decimal) -> Result<()> {
        match self.positions.get_mut(coin_id) {
            Some(mut position) => {
                position.gain_pct = gain_pct;
                position.updated_at = Some(Utc::now());
                Ok(())
            }
            None => Err(LedgerError::Validation(format!(
                "no position to update for {coin_id}"
            ))),
        }
    }
}
