//! Scheduled snapshot -> decide -> accumulate -> recompute loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::coordination::GracefulShutdown;
use crate::domain::Coin;
use crate::error::{LedgerError, Result};
use crate::exchange::{MarketData, OrderGateway};
use crate::persistence::LedgerStore;
use crate::services::Metrics;
use crate::strategy::{DecisionReport, GainReport, PortfolioLedger, TradeDecisionEngine};

/// Summary of one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub coins: u32,
    pub decisions: DecisionReport,
    /// `None` when the gain pass could not read positions
    pub gains: Option<GainReport>,
}

pub struct CycleOrchestrator {
    market: Arc<dyn MarketData>,
    store: Arc<dyn LedgerStore>,
    engine: TradeDecisionEngine,
    ledger: PortfolioLedger,
    metrics: Arc<Metrics>,
    interval: Duration,
    max_retries: u8,
    retry_backoff: Duration,
}

impl CycleOrchestrator {
    pub fn new(
        config: &AppConfig,
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        let ledger = PortfolioLedger::new(Arc::clone(&store), &config.portfolio);
        let engine = TradeDecisionEngine::new(
            Arc::clone(&market),
            gateway,
            ledger.clone(),
            config.strategy.buy_amount,
        )
        .with_request_delay(Duration::from_millis(config.market.request_delay_ms));

        Self {
            market,
            store,
            engine,
            ledger,
            metrics: Arc::new(Metrics::new()),
            interval: config.schedule.interval(),
            max_retries: config.market.max_retries,
            retry_backoff: Duration::from_millis(config.market.retry_backoff_ms),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one full cycle.
    ///
    /// Fails only when the snapshot cannot be fetched or written; per-coin and
    /// per-position problems are absorbed into the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let coins = self.fetch_ranked_coins().await.map_err(|e| {
            error!("Ranked coin list unavailable, abandoning cycle: {}", e);
            e
        })?;

        if let Err(e) = self.store.upsert_coins(&coins).await {
            error!(
                critical = true,
                coins = coins.len(),
                "Failed to write coin snapshot, ending cycle early: {}",
                e
            );
            return Err(e);
        }
        info!("Snapshot stored for {} coins", coins.len());

        let decisions = self.engine.run(&coins).await;

        let gains = match self.ledger.recompute_gains().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(critical = e.is_persistence(), "Gain recomputation aborted: {}", e);
                None
            }
        };

        let report = CycleReport {
            coins: coins.len() as u32,
            decisions,
            gains,
        };

        info!(
            coins = report.coins,
            bought = decisions.bought,
            not_undervalued = decisions.not_undervalued,
            skipped = decisions.skipped,
            failed = decisions.failed,
            unrecorded = decisions.accumulation_failures,
            gains_updated = gains.map(|g| g.updated).unwrap_or(0),
            "Cycle complete"
        );
        Ok(report)
    }

    /// Run cycles until shutdown is requested.
    ///
    /// The stop flag is checked between cycles only; the idle sleep ends early
    /// on shutdown. Store connections are never held across the sleep.
    pub async fn run(&self, shutdown: &GracefulShutdown) {
        info!(
            interval = ?self.interval,
            buy_amount = %self.engine.buy_amount(),
            dry_run = self.engine.is_dry_run(),
            "Cycle loop started"
        );

        while !shutdown.is_shutdown_requested() {
            info!("Cycle starting");
            match self.run_cycle().await {
                Ok(report) => self.metrics.record_cycle(&report),
                Err(e) => {
                    self.metrics.record_failed_cycle();
                    warn!("Cycle failed, retrying after interval: {}", e);
                }
            }
            self.metrics.log_status();

            if shutdown.is_shutdown_requested() {
                break;
            }

            info!(interval = ?self.interval, "Sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => {}
            }
        }

        info!("Cycle loop stopped");
    }

    async fn fetch_ranked_coins(&self) -> Result<Vec<Coin>> {
        let mut attempt: u8 = 0;

        loop {
            match self.market.list_ranked_coins().await {
                Ok(coins) => return Ok(coins),
                Err(e) if e.is_retrieval() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.retry_backoff * u32::from(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        "Ranked coin list fetch failed, retrying in {:?}: {}",
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_retrieval() => return Err(e),
                Err(e) => {
                    return Err(LedgerError::Retrieval(format!("ranked coin list: {e}")));
                }
            }
        }
    }
}
