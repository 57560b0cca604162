use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tabled::{Table, Tabled};

use crate::domain::HeldPosition;

#[derive(Parser)]
#[command(name = "coinledger")]
#[command(author = "Coinledger Team")]
#[command(version = "0.1.0")]
#[command(about = "Top-coin snapshot, mean-reversion buyer and portfolio ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Force dry run mode (paper orders only)
    #[arg(short, long)]
    pub dry_run: bool,

    /// Use an in-process store instead of PostgreSQL (state is lost on exit)
    #[arg(long)]
    pub ephemeral: bool,

    /// Config directory
    #[arg(short, long, default_value = "config", env = "COINLEDGER_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run cycles on the configured interval until Ctrl-C (default)
    Run,
    /// Run a single cycle and exit
    Once,
    /// Apply database migrations and exit
    Migrate,
    /// Print held positions
    Portfolio {
        /// Maximum rows to show
        #[arg(long, default_value = "100")]
        limit: i64,
    },
}

#[derive(Tabled)]
struct PositionRow {
    #[tabled(rename = "Coin")]
    coin: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Paid")]
    paid: String,
    #[tabled(rename = "Avg cost")]
    avg_cost: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Gain %")]
    gain: String,
}

/// Render positions as a table
pub fn render_positions(positions: &[HeldPosition]) -> String {
    if positions.is_empty() {
        return "No positions held".to_string();
    }

    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|held| {
            let p = &held.position;
            let value = held
                .current_price
                .and_then(|price| p.quantity.checked_mul(price));
            PositionRow {
                coin: p.coin_id.clone(),
                quantity: p.quantity.normalize().to_string(),
                paid: p.paid.round_dp(2).to_string(),
                avg_cost: fmt_opt(p.average_cost()),
                price: fmt_opt(held.current_price),
                value: fmt_opt(value),
                gain: p.gain_pct.round_dp(2).to_string(),
            }
        })
        .collect();

    Table::new(rows).to_string()
}

fn fmt_opt(value: Option<Decimal>) -> String {
    value
        .map(|v| v.round_dp(2).to_string())
        .unwrap_or_else(|| "-".to_string())
}
