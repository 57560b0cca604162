use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::domain::{Coin, Fill, HeldPosition, Position};
use crate::error::{LedgerError, Result};
use crate::persistence::{validate_fill, LedgerStore};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        acquire_timeout_secs: u64,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    fn position_from_row(row: &PgRow) -> Position {
        Position {
            id: Some(row.get("id")),
            coin_id: row.get("coin_id"),
            quantity: row.get("quantity"),
            paid: row.get("paid"),
            gain_pct: row.get("gain_pct"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    // ==================== Coins ====================

    #[instrument(skip(self, coins), fields(count = coins.len()))]
    async fn upsert_coins(&self, coins: &[Coin]) -> Result<()> {
        if coins.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for coin in coins {
            sqlx::query(
                r#"
                INSERT INTO coins (coin_id, symbol, name, current_price, market_cap)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (coin_id) DO UPDATE SET
                    symbol = EXCLUDED.symbol,
                    name = EXCLUDED.name,
                    current_price = EXCLUDED.current_price,
                    market_cap = EXCLUDED.market_cap,
                    updated_at = NOW()
                "#,
            )
            .bind(&coin.coin_id)
            .bind(&coin.symbol)
            .bind(&coin.name)
            .bind(coin.current_price)
            .bind(coin.market_cap)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Upserted {} coins", coins.len());
        Ok(())
    }

    // ==================== Portfolio ====================

    /// Additive upsert: the conflict branch adds to the stored row instead of
    /// overwriting it and never touches `gain_pct`.
    #[instrument(skip(self))]
    async fn accumulate_position(&self, fill: &Fill) -> Result<Position> {
        validate_fill(fill)?;

        let row = sqlx::query(
            r#"
            INSERT INTO portfolio (coin_id, quantity, paid, gain_pct)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (coin_id) DO UPDATE SET
                quantity = portfolio.quantity + EXCLUDED.quantity,
                paid = portfolio.paid + EXCLUDED.paid,
                updated_at = NOW()
            RETURNING id, coin_id, quantity, paid, gain_pct, updated_at
            "#,
        )
        .bind(&fill.coin_id)
        .bind(fill.quantity)
        .bind(fill.amount_paid)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::position_from_row(&row))
    }

    async fn get_position(&self, coin_id: &str) -> Result<Option<Position>> {
        let row = sqlx::query(
            r#"
            SELECT id, coin_id, quantity, paid, gain_pct, updated_at
            FROM portfolio WHERE coin_id = $1
            "#,
        )
        .bind(coin_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::position_from_row))
    }

    #[instrument(skip(self))]
    async fn held_positions(&self, limit: i64, offset: i64) -> Result<Vec<HeldPosition>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.coin_id, p.quantity, p.paid, p.gain_pct, p.updated_at,
                   c.current_price
            FROM portfolio p
            LEFT JOIN coins c ON c.coin_id = p.coin_id
            ORDER BY p.id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HeldPosition {
                position: Self::position_from_row(row),
                current_price: row.get::<Option<Decimal>, _>("current_price"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn set_gain(&self, coin_id: &str, gain_pct: Decimal) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE portfolio
            SET gain_pct = $2, updated_at = NOW()
            WHERE coin_id = $1
            "#,
        )
        .bind(coin_id)
        .bind(gain_pct)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Validation(format!(
                "no position to update for {coin_id}"
            )));
        }
        Ok(())
    }
}
