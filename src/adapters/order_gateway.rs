use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::domain::{OrderReceipt, OrderRequest};
use crate::error::{LedgerError, Result};
use crate::exchange::OrderGateway;

/// Dry-run gateway: every order fills at the requested price
#[derive(Default)]
pub struct PaperOrderGateway {
    sequence: AtomicU64,
}

impl PaperOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders_filled(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OrderGateway for PaperOrderGateway {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderReceipt> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            coin_id = %request.coin_id,
            quantity = %request.quantity,
            price = %request.price,
            "[DRY RUN] {} order filled",
            request.side
        );

        Ok(OrderReceipt {
            order_id: format!("paper-{seq}"),
            client_order_id: request.client_order_id.clone(),
            executed_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Live gateway that POSTs buy orders as JSON to a configured endpoint
#[derive(Clone)]
pub struct HttpOrderGateway {
    http: Client,
    order_url: String,
}

impl HttpOrderGateway {
    pub fn new(order_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("coinledger/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| {
                LedgerError::Internal(format!("failed to build order HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            order_url: order_url.to_string(),
        })
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderReceipt> {
        let response = self
            .http
            .post(&self.order_url)
            .json(request)
            .send()
            .await
            .map_err(|e| LedgerError::OrderSubmission(format!("{}: {}", request.coin_id, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::OrderSubmission(format!(
                "{}: gateway returned {}",
                request.coin_id, status
            )));
        }

        let body: OrderResponse = response.json().await.map_err(|e| {
            LedgerError::OrderSubmission(format!("{}: unreadable response: {}", request.coin_id, e))
        })?;

        parse_order_response(request, body)
    }
}

fn parse_order_response(request: &OrderRequest, body: OrderResponse) -> Result<OrderReceipt> {
    if !body.success {
        return Err(LedgerError::OrderSubmission(format!(
            "{}: rejected: {}",
            request.coin_id,
            body.error.unwrap_or_else(|| "no reason given".to_string())
        )));
    }

    Ok(OrderReceipt {
        order_id: body
            .order_id
            .unwrap_or_else(|| request.client_order_id.clone()),
        client_order_id: request.client_order_id.clone(),
        executed_at: Utc::now(),
    })
}
