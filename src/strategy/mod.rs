pub mod decision;
pub mod ledger;

pub use decision::{is_undervalued, trailing_mean, CoinDecision, DecisionReport, TradeDecisionEngine};
pub use ledger::{gain_pct, GainReport, PortfolioLedger};
