//! PostgREST client for the `pedidos` and `eventos` tables.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use ingresso_core::{
    BuyerData, CartItem, CouponId, EventId, EventSessionId, Money, OrderId, OrderStatus,
    PaymentMethod, ProductLine, UserId,
};

use super::{SupabaseError, error_message};
use crate::config::SupabaseConfig;

/// Timeout for calls to PostgREST.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// An order row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub evento_id: EventId,
    pub sessao_id: EventSessionId,
    pub forma_pagamento: PaymentMethod,
    pub total: Money,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub asaas_payment_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Columns written when an order is created.
#[derive(Debug, Serialize)]
pub struct NewOrder<'a> {
    pub evento_id: &'a EventId,
    pub sessao_id: &'a EventSessionId,
    pub itens: &'a [CartItem],
    pub produtos: &'a [ProductLine],
    pub forma_pagamento: PaymentMethod,
    pub comprador: &'a BuyerData,
    pub user_id: Option<&'a UserId>,
    pub cupom_id: Option<&'a CouponId>,
    pub total: Money,
    pub status: OrderStatus,
    pub idempotency_key: Option<&'a str>,
}

/// An event as returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: EventId,
    pub titulo: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub imagem_url: Option<String>,
}

#[derive(Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// PostgREST client authenticated with the service-role key.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a new PostgREST client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        let key = config.service_role_key.expose_secret();
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(key)
                .map_err(|e| SupabaseError::Parse(format!("Invalid service key format: {e}")))?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| SupabaseError::Parse(format!("Invalid service key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    fn table(&self, name: &str) -> Result<Url, SupabaseError> {
        self.base_url
            .join(&format!("rest/v1/{name}"))
            .map_err(|e| SupabaseError::Parse(format!("Invalid Supabase URL: {e}")))
    }

    /// Insert a new order and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns `SupabaseError::Conflict` if the idempotency key is already
    /// taken, other variants if the request fails.
    #[instrument(skip(self, order), fields(evento_id = %order.evento_id))]
    pub async fn insert_order(&self, order: &NewOrder<'_>) -> Result<OrderRecord, SupabaseError> {
        let response = self
            .client
            .post(self.table("pedidos")?)
            .header("Prefer", "return=representation")
            .json(order)
            .send()
            .await?;
        let rows: Vec<OrderRecord> = read_rows(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SupabaseError::Parse("insert returned no rows".to_string()))
    }

    /// Fetch an order by id.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_order(&self, id: &OrderId) -> Result<Option<OrderRecord>, SupabaseError> {
        self.find_order("id", id.as_str()).await
    }

    /// Fetch the order created under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip_all)]
    pub async fn find_order_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<OrderRecord>, SupabaseError> {
        self.find_order("idempotency_key", key).await
    }

    async fn find_order(&self, column: &str, value: &str) -> Result<Option<OrderRecord>, SupabaseError> {
        let filter = format!("eq.{value}");
        let response = self
            .client
            .get(self.table("pedidos")?)
            .query(&[("select", "*"), (column, filter.as_str()), ("limit", "1")])
            .send()
            .await?;
        let rows: Vec<OrderRecord> = read_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    /// Record the gateway payment created for an order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn set_payment_id(&self, id: &OrderId, payment_id: &str) -> Result<(), SupabaseError> {
        self.patch_order(id, &serde_json::json!({ "asaas_payment_id": payment_id }))
            .await
            .map(|_| ())
    }

    /// Update an order's status. Returns false if no order matched.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<bool, SupabaseError> {
        let rows = self
            .patch_order(id, &serde_json::json!({ "status": status }))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn patch_order(
        &self,
        id: &OrderId,
        changes: &serde_json::Value,
    ) -> Result<Vec<OrderRecord>, SupabaseError> {
        let response = self
            .client
            .patch(self.table("pedidos")?)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(changes)
            .send()
            .await?;
        read_rows(response).await
    }

    /// Search published events by title.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn search_events(&self, term: &str, limit: usize) -> Result<Vec<EventSummary>, SupabaseError> {
        let pattern = format!("ilike.*{}*", sanitize_pattern(term));
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.table("eventos")?)
            .query(&[
                ("select", "id,titulo,data,local,imagem_url"),
                ("titulo", pattern.as_str()),
                ("publicado", "eq.true"),
                ("order", "data.asc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        read_rows(response).await
    }
}

/// Decode a PostgREST row array, mapping error bodies.
async fn read_rows<T: DeserializeOwned>(response: reqwest::Response) -> Result<Vec<T>, SupabaseError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| SupabaseError::Parse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<PostgrestError>(&body).ok();
    if status == StatusCode::CONFLICT
        || parsed.as_ref().and_then(|e| e.code.as_deref()) == Some(UNIQUE_VIOLATION)
    {
        let message = parsed
            .and_then(|e| e.message)
            .unwrap_or_else(|| "duplicate key".to_string());
        return Err(SupabaseError::Conflict(message));
    }
    Err(SupabaseError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Drop characters with meaning in PostgREST filters and `LIKE` patterns.
fn sanitize_pattern(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, '*' | '%' | '_' | ',' | '(' | ')' | '\\' | '"'))
        .collect()
}
