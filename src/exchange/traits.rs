use async_trait::async_trait;

use crate::domain::{Coin, OrderReceipt, OrderRequest, PricePoint};
use crate::error::Result;

/// Market-data capabilities consumed by the cycle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Coins ordered by market capitalization, largest first
    async fn list_ranked_coins(&self) -> Result<Vec<Coin>>;

    /// Time-ordered price history for a coin. May be empty.
    async fn get_price_history(&self, coin_id: &str) -> Result<Vec<PricePoint>>;
}

/// Buy-order execution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    fn is_dry_run(&self) -> bool;

    /// `Ok` only when the order was executed. Any failure is an `Err`.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderReceipt>;
}
