//! Portfolio ledger: additive accumulation of buys and gain recomputation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::PortfolioConfig;
use crate::domain::{Fill, HeldPosition, Position};
use crate::error::{LedgerError, Result};
use crate::persistence::LedgerStore;

/// Outcome of one gain recomputation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GainReport {
    pub updated: u32,
    /// Zero cost basis, overflow or missing snapshot price
    pub skipped: u32,
    /// Store write failures, including a position vanishing before its gain is written
    pub failed: u32,
    pub pages: u32,
}

/// Percentage gain of a position at `current_price`:
/// `((quantity * current_price - paid) / paid) * 100`
pub fn gain_pct(coin_id: &str, quantity: Decimal, paid: Decimal, current_price: Decimal) -> Result<Decimal> {
    if paid.is_zero() {
        return Err(LedgerError::ZeroCostBasis {
            coin_id: coin_id.to_string(),
        });
    }

    let overflow = || LedgerError::ArithmeticOverflow(format!("gain of {coin_id}"));
    let current_value = quantity.checked_mul(current_price).ok_or_else(overflow)?;
    let delta = current_value.checked_sub(paid).ok_or_else(overflow)?;

    delta
        .checked_div(paid)
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .ok_or_else(overflow)
}

#[derive(Clone)]
pub struct PortfolioLedger {
    store: Arc<dyn LedgerStore>,
    page_size: u32,
    paginate: bool,
}

impl PortfolioLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &PortfolioConfig) -> Self {
        Self {
            store,
            page_size: config.recompute_page_size.max(1),
            paginate: config.paginate,
        }
    }

    /// Fold a confirmed buy into the position for its coin.
    ///
    /// Delegates to the store's single additive upsert; the stored gain stays
    /// stale until the next recomputation pass.
    pub async fn accumulate(&self, fill: &Fill) -> Result<Position> {
        let position = self.store.accumulate_position(fill).await?;
        debug!(
            coin_id = %position.coin_id,
            quantity = %position.quantity,
            paid = %position.paid,
            "Position accumulated"
        );
        Ok(position)
    }

    /// Recompute and store the gain of held positions.
    ///
    /// Only the first page is visited unless pagination is enabled. A failure
    /// on one position never stops the others; only a failed page read aborts.
    pub async fn recompute_gains(&self) -> Result<GainReport> {
        let mut report = GainReport::default();
        let limit = i64::from(self.page_size);
        let mut offset: i64 = 0;

        loop {
            let page = self.store.held_positions(limit, offset).await?;
            report.pages += 1;
            let page_len = page.len();

            for held in &page {
                match self.recompute_one(held).await {
                    Ok(_) => report.updated += 1,
                    Err(e) if e.is_skippable_gain() => {
                        warn!(coin_id = %held.position.coin_id, "Skipping gain recomputation: {}", e);
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(coin_id = %held.position.coin_id, "Failed to store gain: {}", e);
                        report.failed += 1;
                    }
                }
            }

            if !self.paginate || (page_len as i64) < limit {
                if !self.paginate && page_len as i64 == limit {
                    debug!("Gain recomputation capped at {} positions", limit);
                }
                break;
            }
            offset += limit;
        }

        info!(
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Gain recomputation finished"
        );
        Ok(report)
    }

    async fn recompute_one(&self, held: &HeldPosition) -> Result<Decimal> {
        let position = &held.position;
        let current_price = held.current_price.ok_or_else(|| LedgerError::MissingPrice {
            coin_id: position.coin_id.clone(),
        })?;

        let gain = gain_pct(&position.coin_id, position.quantity, position.paid, current_price)?;
        self.store.set_gain(&position.coin_id, gain).await?;
        Ok(gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coin;
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;

    fn ledger(store: Arc<MemoryStore>, page_size: u32, paginate: bool) -> PortfolioLedger {
        PortfolioLedger::new(
            store,
            &PortfolioConfig {
                recompute_page_size: page_size,
                paginate,
            },
        )
    }

    async fn store_with_coins(prices: &[(&str, Decimal)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let coins: Vec<Coin> = prices
            .iter()
            .map(|(id, price)| Coin::new(*id, *id, *id, *price, dec!(1)))
            .collect();
        store.upsert_coins(&coins).await.unwrap();
        store
    }

    #[test]
    fn test_gain_pct_scenario() {
        // 3 units bought for 380 total, now worth 150 each -> 450
        let gain = gain_pct("bitcoin", dec!(3), dec!(380), dec!(150)).unwrap();
        assert_eq!(gain.round_dp(2), dec!(18.42));
    }

    #[test]
    fn test_gain_pct_loss() {
        let gain = gain_pct("bitcoin", dec!(2), dec!(300), dec!(75)).unwrap();
        assert_eq!(gain, dec!(-50));
    }

    #[test]
    fn test_gain_pct_zero_paid() {
        let err = gain_pct("bitcoin", dec!(1), dec!(0), dec!(150)).unwrap_err();
        assert!(matches!(err, LedgerError::ZeroCostBasis { ref coin_id } if coin_id == "bitcoin"));
    }

    #[tokio::test]
    async fn test_accumulate_scenario() {
        let store = store_with_coins(&[("bitcoin", dec!(80))]).await;
        let ledger = ledger(store.clone(), 20, false);

        ledger.accumulate(&Fill::new("bitcoin", dec!(2), dec!(300))).await.unwrap();
        let position = ledger.accumulate(&Fill::new("bitcoin", dec!(1), dec!(80))).await.unwrap();

        assert_eq!(position.quantity, dec!(3));
        assert_eq!(position.paid, dec!(380));
        assert!(position.is_consistent());
    }

    #[tokio::test]
    async fn test_accumulation_order_does_not_matter() {
        let a = store_with_coins(&[("eth", dec!(1))]).await;
        let b = store_with_coins(&[("eth", dec!(1))]).await;
        let first = Fill::new("eth", dec!(1.5), dec!(120.25));
        let second = Fill::new("eth", dec!(2), dec!(80));

        let ledger_a = ledger(a, 20, false);
        ledger_a.accumulate(&first).await.unwrap();
        let pa = ledger_a.accumulate(&second).await.unwrap();

        let ledger_b = ledger(b, 20, false);
        ledger_b.accumulate(&second).await.unwrap();
        let pb = ledger_b.accumulate(&first).await.unwrap();

        assert_eq!((pa.quantity, pa.paid), (pb.quantity, pb.paid));
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let store = store_with_coins(&[("bitcoin", dec!(150))]).await;
        let ledger = ledger(store.clone(), 20, false);
        ledger.accumulate(&Fill::new("bitcoin", dec!(3), dec!(380))).await.unwrap();

        ledger.recompute_gains().await.unwrap();
        let once = store.get_position("bitcoin").await.unwrap().unwrap().gain_pct;
        ledger.recompute_gains().await.unwrap();
        let twice = store.get_position("bitcoin").await.unwrap().unwrap().gain_pct;

        assert_eq!(once, twice);
        assert_eq!(once.round_dp(2), dec!(18.42));
    }

    #[tokio::test]
    async fn test_zero_paid_position_is_skipped_others_recomputed() {
        let store = store_with_coins(&[("broken", dec!(10)), ("bitcoin", dec!(150))]).await;
        store.seed_position(Position {
            id: None,
            coin_id: "broken".to_string(),
            quantity: dec!(1),
            paid: Decimal::ZERO,
            gain_pct: dec!(7),
            updated_at: None,
        });
        let ledger = ledger(store.clone(), 20, false);
        ledger.accumulate(&Fill::new("bitcoin", dec!(3), dec!(380))).await.unwrap();

        let report = ledger.recompute_gains().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        let broken = store.get_position("broken").await.unwrap().unwrap();
        assert_eq!(broken.gain_pct, dec!(7));
        let held = store.get_position("bitcoin").await.unwrap().unwrap();
        assert_eq!(held.gain_pct.round_dp(2), dec!(18.42));
    }

    #[tokio::test]
    async fn test_position_without_snapshot_price_is_skipped() {
        let store = store_with_coins(&[("bitcoin", dec!(150))]).await;
        store.seed_position(Position {
            id: None,
            coin_id: "delisted".to_string(),
            quantity: dec!(2),
            paid: dec!(40),
            gain_pct: dec!(-3),
            updated_at: None,
        });
        let ledger = ledger(store.clone(), 20, false);
        ledger.accumulate(&Fill::new("bitcoin", dec!(3), dec!(380))).await.unwrap();

        let report = ledger.recompute_gains().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        let delisted = store.get_position("delisted").await.unwrap().unwrap();
        assert_eq!(delisted.gain_pct, dec!(-3));
        let held = store.get_position("bitcoin").await.unwrap().unwrap();
        assert_eq!(held.gain_pct.round_dp(2), dec!(18.42));
    }

    /// Lists positions but has lost every row by the time gains are written
    struct VanishingStore(MemoryStore);

    #[async_trait]
    impl LedgerStore for VanishingStore {
        async fn upsert_coins(&self, coins: &[Coin]) -> Result<()> {
            self.0.upsert_coins(coins).await
        }

        async fn accumulate_position(&self, fill: &Fill) -> Result<Position> {
            self.0.accumulate_position(fill).await
        }

        async fn get_position(&self, coin_id: &str) -> Result<Option<Position>> {
            self.0.get_position(coin_id).await
        }

        async fn held_positions(&self, limit: i64, offset: i64) -> Result<Vec<HeldPosition>> {
            self.0.held_positions(limit, offset).await
        }

        async fn set_gain(&self, coin_id: &str, _gain_pct: Decimal) -> Result<()> {
            Err(LedgerError::Validation(format!("no position to update for {coin_id}")))
        }
    }

    #[tokio::test]
    async fn test_gain_write_miss_counts_as_failed() {
        let inner = MemoryStore::new();
        inner
            .upsert_coins(&[Coin::new("bitcoin", "btc", "Bitcoin", dec!(150), dec!(1))])
            .await
            .unwrap();
        inner
            .accumulate_position(&Fill::new("bitcoin", dec!(3), dec!(380)))
            .await
            .unwrap();
        let ledger = PortfolioLedger::new(Arc::new(VanishingStore(inner)), &PortfolioConfig::default());

        let report = ledger.recompute_gains().await.unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_single_page_cap_without_pagination() {
        let ids: Vec<String> = (0..5).map(|i| format!("c{i}")).collect();
        let prices: Vec<(&str, Decimal)> = ids.iter().map(|id| (id.as_str(), dec!(2))).collect();
        let store = store_with_coins(&prices).await;
        let capped = ledger(store.clone(), 2, false);
        for id in &ids {
            capped.accumulate(&Fill::new(id.clone(), dec!(1), dec!(1))).await.unwrap();
        }

        let report = capped.recompute_gains().await.unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.pages, 1);

        let paged = ledger(store.clone(), 2, true);
        let report = paged.recompute_gains().await.unwrap();
        assert_eq!(report.updated, 5);
        assert_eq!(report.pages, 3);
        let last = store.get_position("c4").await.unwrap().unwrap();
        assert_eq!(last.gain_pct, dec!(100));
    }
}
