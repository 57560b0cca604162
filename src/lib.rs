pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod persistence;
pub mod services;
pub mod strategy;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use error::{LedgerError, Result};
pub use exchange::{MarketData, OrderGateway};
pub use persistence::{LedgerStore, MemoryStore};
pub use services::{CycleOrchestrator, CycleReport, Metrics};
pub use strategy::{PortfolioLedger, TradeDecisionEngine};
