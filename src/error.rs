use thiserror::Error;

/// Main error type for the ledger bot
#[derive(Error, Debug)]
pub enum LedgerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data retrieval failed: {0}")]
    Retrieval(String),

    // Order execution errors
    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    // Arithmetic errors (skipped per coin / per position)
    #[error("Empty price history for coin: {coin_id}")]
    EmptyPriceHistory { coin_id: String },

    #[error("Zero cost basis for position: {coin_id}")]
    ZeroCostBasis { coin_id: String },

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    #[error("No snapshot price for position: {coin_id}")]
    MissingPrice { coin_id: String },

    // Ledger errors
    #[error("Order {order_id} executed but not recorded for {coin_id}: {source}")]
    UnrecordedFill {
        coin_id: String,
        order_id: String,
        #[source]
        source: Box<LedgerError>,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Failures of the market-data collaborator, whatever layer raised them.
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self,
            LedgerError::Retrieval(_) | LedgerError::Http(_) | LedgerError::Json(_)
        )
    }

    /// Per-coin or per-position arithmetic problems that are logged as warnings and skipped.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            LedgerError::EmptyPriceHistory { .. }
                | LedgerError::ZeroCostBasis { .. }
                | LedgerError::ArithmeticOverflow(_)
        )
    }

    /// Per-position problems in the gain pass that leave the stored gain as-is.
    pub fn is_skippable_gain(&self) -> bool {
        self.is_arithmetic() || matches!(self, LedgerError::MissingPrice { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Migration(_))
    }
}

/// Result type alias for LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;
