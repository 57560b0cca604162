//! Mean-reversion buy rule.
//!
//! A coin is undervalued when its current price is strictly below the mean of
//! its price history. Each undervalued coin gets one buy of the configured
//! amount per cycle, whether or not it is already held.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::ledger::PortfolioLedger;
use crate::domain::{Coin, Fill, OrderRequest, Position, PricePoint};
use crate::error::{LedgerError, Result};
use crate::exchange::{MarketData, OrderGateway};

/// Arithmetic mean of every price in the history
pub fn trailing_mean(coin_id: &str, history: &[PricePoint]) -> Result<Decimal> {
    if history.is_empty() {
        return Err(LedgerError::EmptyPriceHistory {
            coin_id: coin_id.to_string(),
        });
    }

    let sum = history
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.price))
        .ok_or_else(|| LedgerError::ArithmeticOverflow(format!("history sum of {coin_id}")))?;

    sum.checked_div(Decimal::from(history.len()))
        .ok_or_else(|| LedgerError::ArithmeticOverflow(format!("history mean of {coin_id}")))
}

pub fn is_undervalued(current_price: Decimal, mean: Decimal) -> bool {
    current_price < mean
}

/// What happened to one coin in a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinDecision {
    Bought {
        order_id: String,
        fill: Fill,
        position: Position,
        mean: Decimal,
    },
    NotUndervalued {
        mean: Decimal,
    },
    Skipped {
        reason: String,
    },
}

/// Per-cycle tally of decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionReport {
    pub evaluated: u32,
    pub bought: u32,
    pub not_undervalued: u32,
    /// Empty history, unusable price, arithmetic problems
    pub skipped: u32,
    /// Retrieval, order or store failures
    pub failed: u32,
    /// Orders the gateway rejected
    pub order_failures: u32,
    /// Orders executed whose fill could not be recorded
    pub accumulation_failures: u32,
}

impl DecisionReport {
    /// Orders that reached the gateway, whatever happened afterwards
    pub fn orders_submitted(&self) -> u32 {
        self.bought + self.order_failures + self.accumulation_failures
    }
}

#[derive(Clone)]
pub struct TradeDecisionEngine {
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    ledger: PortfolioLedger,
    buy_amount: Decimal,
    request_delay: Duration,
}

impl TradeDecisionEngine {
    pub fn new(
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        ledger: PortfolioLedger,
        buy_amount: Decimal,
    ) -> Self {
        Self {
            market,
            gateway,
            ledger,
            buy_amount,
            request_delay: Duration::ZERO,
        }
    }

    /// Pause between coins to stay under the market-data rate limit
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn buy_amount(&self) -> Decimal {
        self.buy_amount
    }

    pub fn is_dry_run(&self) -> bool {
        self.gateway.is_dry_run()
    }

    /// Evaluate every coin independently
    pub async fn run(&self, coins: &[Coin]) -> DecisionReport {
        let mut report = DecisionReport::default();

        for (idx, coin) in coins.iter().enumerate() {
            if idx > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            report.evaluated += 1;
            debug!(price = %coin.current_price, "Evaluating {}", coin);
            match self.evaluate_coin(coin).await {
                Ok(CoinDecision::Bought {
                    order_id,
                    fill,
                    position,
                    mean,
                }) => {
                    info!(
                        coin_id = %coin.coin_id,
                        price = %coin.current_price,
                        mean = %mean,
                        order_id = %order_id,
                        paid = %fill.amount_paid,
                        total_quantity = %position.quantity,
                        "Undervalued, bought"
                    );
                    report.bought += 1;
                }
                Ok(CoinDecision::NotUndervalued { mean }) => {
                    debug!(coin_id = %coin.coin_id, price = %coin.current_price, mean = %mean, "Not undervalued");
                    report.not_undervalued += 1;
                }
                Ok(CoinDecision::Skipped { reason }) => {
                    warn!(coin_id = %coin.coin_id, "Skipping coin: {}", reason);
                    report.skipped += 1;
                }
                Err(e) if e.is_arithmetic() => {
                    warn!(coin_id = %coin.coin_id, "Skipping coin: {}", e);
                    report.skipped += 1;
                }
                Err(e @ LedgerError::OrderSubmission(_)) => {
                    error!(coin_id = %coin.coin_id, "Order not executed, ledger untouched: {}", e);
                    report.order_failures += 1;
                    report.failed += 1;
                }
                Err(e @ LedgerError::UnrecordedFill { .. }) => {
                    error!(coin_id = %coin.coin_id, "Needs manual reconciliation: {}", e);
                    report.accumulation_failures += 1;
                    report.failed += 1;
                }
                Err(e) => {
                    error!(coin_id = %coin.coin_id, "Coin evaluation failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Decide for one coin and, when undervalued, buy and record the fill
    pub async fn evaluate_coin(&self, coin: &Coin) -> Result<CoinDecision> {
        if !coin.has_tradable_price() {
            return Ok(CoinDecision::Skipped {
                reason: format!("non-positive current price {}", coin.current_price),
            });
        }

        let history = self.market.get_price_history(&coin.coin_id).await?;
        let mean = trailing_mean(&coin.coin_id, &history)?;

        if !is_undervalued(coin.current_price, mean) {
            return Ok(CoinDecision::NotUndervalued { mean });
        }

        let request = OrderRequest::buy(coin.coin_id.clone(), self.buy_amount, coin.current_price);
        let amount_paid = request.notional().ok_or_else(|| {
            LedgerError::ArithmeticOverflow(format!("order notional of {}", coin.coin_id))
        })?;

        let receipt = self.gateway.submit_order(&request).await?;

        let fill = Fill::new(coin.coin_id.clone(), request.quantity, amount_paid);
        let position = self.ledger.accumulate(&fill).await.map_err(|e| {
            error!(
                coin_id = %coin.coin_id,
                order_id = %receipt.order_id,
                quantity = %fill.quantity,
                paid = %fill.amount_paid,
                critical = true,
                "Order executed but ledger accumulation failed"
            );
            LedgerError::UnrecordedFill {
                coin_id: coin.coin_id.clone(),
                order_id: receipt.order_id.clone(),
                source: Box::new(e),
            }
        })?;

        Ok(CoinDecision::Bought {
            order_id: receipt.order_id,
            fill,
            position,
            mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortfolioConfig;
    use crate::domain::OrderReceipt;
    use crate::exchange::{MockMarketData, MockOrderGateway};
    use crate::persistence::{LedgerStore, MemoryStore};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn history(prices: &[Decimal]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint::new(Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(), *p))
            .collect()
    }

    fn receipt(request: &OrderRequest) -> OrderReceipt {
        OrderReceipt {
            order_id: format!("ord-{}", request.coin_id),
            client_order_id: request.client_order_id.clone(),
            executed_at: Utc::now(),
        }
    }

    async fn engine(
        market: MockMarketData,
        gateway: MockOrderGateway,
        coins: &[Coin],
    ) -> (TradeDecisionEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.upsert_coins(coins).await.unwrap();
        let ledger = PortfolioLedger::new(store.clone(), &PortfolioConfig::default());
        let engine = TradeDecisionEngine::new(Arc::new(market), Arc::new(gateway), ledger, dec!(1));
        (engine, store)
    }

    #[test]
    fn test_trailing_mean() {
        let mean = trailing_mean("bitcoin", &history(&[dec!(100), dec!(200), dec!(300)])).unwrap();
        assert_eq!(mean, dec!(200));
    }

    #[test]
    fn test_trailing_mean_empty() {
        let err = trailing_mean("bitcoin", &[]).unwrap_err();
        assert!(matches!(err, LedgerError::EmptyPriceHistory { .. }));
    }

    #[test]
    fn test_is_undervalued_is_strict() {
        assert!(is_undervalued(dec!(150), dec!(200)));
        assert!(!is_undervalued(dec!(200), dec!(200)));
        assert!(!is_undervalued(dec!(250), dec!(200)));
    }

    #[tokio::test]
    async fn test_below_mean_buys_once() {
        let coin = Coin::new("bitcoin", "btc", "Bitcoin", dec!(150), dec!(1000));

        let mut market = MockMarketData::new();
        market
            .expect_get_price_history()
            .times(1)
            .returning(|_| Ok(history(&[dec!(100), dec!(200), dec!(300)])));

        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_submit_order()
            .withf(|r| r.coin_id == "bitcoin" && r.quantity == dec!(1) && r.price == dec!(150))
            .times(1)
            .returning(|r| Ok(receipt(r)));

        let (engine, store) = engine(market, gateway, std::slice::from_ref(&coin)).await;
        let decision = engine.evaluate_coin(&coin).await.unwrap();

        match decision {
            CoinDecision::Bought { fill, mean, .. } => {
                assert_eq!(mean, dec!(200));
                assert_eq!(fill.amount_paid, dec!(150));
            }
            other => panic!("expected a buy, got {other:?}"),
        }
        let position = store.get_position("bitcoin").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(position.paid, dec!(150));
    }

    #[tokio::test]
    async fn test_at_or_above_mean_places_no_order() {
        let at_mean = Coin::new("eth", "eth", "Ethereum", dec!(200), dec!(1));
        let above = Coin::new("sol", "sol", "Solana", dec!(250), dec!(1));

        let mut market = MockMarketData::new();
        market
            .expect_get_price_history()
            .times(2)
            .returning(|_| Ok(history(&[dec!(100), dec!(200), dec!(300)])));

        let mut gateway = MockOrderGateway::new();
        gateway.expect_submit_order().never();

        let coins = vec![at_mean, above];
        let (engine, store) = engine(market, gateway, &coins).await;
        let report = engine.run(&coins).await;

        assert_eq!(report.not_undervalued, 2);
        assert_eq!(report.bought, 0);
        assert_eq!(store.position_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_history_is_skipped() {
        let coin = Coin::new("new-coin", "new", "New", dec!(1), dec!(1));

        let mut market = MockMarketData::new();
        market.expect_get_price_history().returning(|_| Ok(Vec::new()));
        let mut gateway = MockOrderGateway::new();
        gateway.expect_submit_order().never();

        let coins = vec![coin];
        let (engine, store) = engine(market, gateway, &coins).await;
        let report = engine.run(&coins).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.position_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_order_does_not_touch_ledger() {
        let coin = Coin::new("bitcoin", "btc", "Bitcoin", dec!(50), dec!(1));

        let mut market = MockMarketData::new();
        market
            .expect_get_price_history()
            .returning(|_| Ok(history(&[dec!(100)])));
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_submit_order()
            .times(1)
            .returning(|_| Err(LedgerError::OrderSubmission("rejected".to_string())));

        let coins = vec![coin];
        let (engine, store) = engine(market, gateway, &coins).await;
        let report = engine.run(&coins).await;

        assert_eq!(report.order_failures, 1);
        assert_eq!(report.failed, 1);
        assert!(store.get_position("bitcoin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unrecorded_fill_is_counted_separately() {
        let coin = Coin::new("bitcoin", "btc", "Bitcoin", dec!(50), dec!(1));

        let mut market = MockMarketData::new();
        market
            .expect_get_price_history()
            .returning(|_| Ok(history(&[dec!(100)])));
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_submit_order()
            .times(2)
            .returning(|r| Ok(receipt(r)));

        // No coin row in the store, so accumulation is rejected after the order fills
        let (engine, store) = engine(market, gateway, &[]).await;
        let report = engine.run(std::slice::from_ref(&coin)).await;

        assert_eq!(report.accumulation_failures, 1);
        assert_eq!(report.order_failures, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.orders_submitted(), 1);
        assert_eq!(store.position_count(), 0);

        let err = engine.evaluate_coin(&coin).await;
        assert!(matches!(
            err,
            Err(LedgerError::UnrecordedFill { ref order_id, .. }) if order_id == "ord-bitcoin"
        ));
    }

    #[tokio::test]
    async fn test_one_failing_coin_does_not_block_others() {
        let broken = Coin::new("broken", "brk", "Broken", dec!(10), dec!(1));
        let good = Coin::new("good", "gd", "Good", dec!(10), dec!(1));

        let mut market = MockMarketData::new();
        market.expect_get_price_history().returning(|id| match id {
            "broken" => Err(LedgerError::Retrieval("timeout".to_string())),
            _ => Ok(history(&[dec!(20), dec!(30)])),
        });
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_submit_order()
            .withf(|r| r.coin_id == "good")
            .times(1)
            .returning(|r| Ok(receipt(r)));

        let coins = vec![broken, good];
        let (engine, store) = engine(market, gateway, &coins).await;
        let report = engine.run(&coins).await;

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.bought, 1);
        assert!(store.get_position("good").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_held_coin_is_bought_again() {
        let coin = Coin::new("bitcoin", "btc", "Bitcoin", dec!(80), dec!(1));

        let mut market = MockMarketData::new();
        market
            .expect_get_price_history()
            .returning(|_| Ok(history(&[dec!(100)])));
        let mut gateway = MockOrderGateway::new();
        gateway
            .expect_submit_order()
            .times(2)
            .returning(|r| Ok(receipt(r)));

        let coins = vec![coin];
        let (engine, store) = engine(market, gateway, &coins).await;
        engine.run(&coins).await;
        engine.run(&coins).await;

        let position = store.get_position("bitcoin").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.paid, dec!(160));
    }

    #[tokio::test]
    async fn test_zero_price_is_skipped_without_lookup() {
        let coin = Coin::new("dust", "dst", "Dust", Decimal::ZERO, Decimal::ZERO);

        let mut market = MockMarketData::new();
        market.expect_get_price_history().never();
        let mut gateway = MockOrderGateway::new();
        gateway.expect_submit_order().never();

        let coins = vec![coin];
        let (engine, _store) = engine(market, gateway, &coins).await;
        let report = engine.run(&coins).await;
        assert_eq!(report.skipped, 1);
    }
}
