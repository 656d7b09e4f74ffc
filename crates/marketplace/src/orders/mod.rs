//! Order creation, payment instructions and payment status updates.
//!
//! Orders are written to `pedidos` first (status `pendente`), then charged
//! through Asaas with the order id as `externalReference`. A retry with the
//! same idempotency key resumes a half-finished order instead of creating a
//! second one.

mod idempotency;

pub use idempotency::{IDEMPOTENCY_TTL, IdempotencyCache};

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use ingresso_core::{Money, OrderId, OrderPayload, OrderStatus, PaymentMethod, ValidationError};

use crate::asaas::{self, AsaasClient, AsaasError, NewCustomer, NewPayment, Payment, PixQrCode, Split, WebhookEvent};
use crate::config::AsaasConfig;
use crate::supabase::{AuthUser, NewOrder, OrderRecord, RestClient, SupabaseError};

/// Errors from the order service.
///
/// Cloneable so that coalesced idempotent requests can share one outcome.
#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("Idempotency key was already used for a different order")]
    IdempotencyConflict,

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order {0} has no payment yet")]
    PaymentPending(OrderId),

    #[error("Database error: {0}")]
    Database(Arc<SupabaseError>),

    #[error("Payment gateway error: {0}")]
    Gateway(Arc<AsaasError>),
}

impl From<SupabaseError> for OrderError {
    fn from(err: SupabaseError) -> Self {
        Self::Database(Arc::new(err))
    }
}

impl From<AsaasError> for OrderError {
    fn from(err: AsaasError) -> Self {
        Self::Gateway(Arc::new(err))
    }
}

/// How to pay an order, as shown on the confirmation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInstructions {
    #[serde(rename = "pedidoId")]
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(rename = "formaPagamento")]
    pub payment_method: PaymentMethod,
    #[serde(rename = "valor")]
    pub total: Money,
    #[serde(flatten)]
    pub detail: PaymentDetail,
}

/// Method-specific payment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum PaymentDetail {
    Pix(PixQrCode),
    Boleto {
        #[serde(rename = "boletoUrl")]
        url: String,
    },
    Cartao {
        #[serde(rename = "invoiceUrl")]
        url: String,
    },
}

/// Result of processing a webhook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Updated { order_id: OrderId, status: OrderStatus },
    Ignored(&'static str),
}

/// Gateway settings applied to every charge.
#[derive(Debug, Clone)]
struct ChargeSettings {
    due_days: u32,
    split: Option<Split>,
}

impl ChargeSettings {
    fn from_config(config: &AsaasConfig) -> Self {
        let split = config
            .wallet_id
            .clone()
            .zip(config.split_percent)
            .map(|(wallet_id, percentual_value)| Split {
                wallet_id,
                percentual_value,
            });
        Self {
            due_days: config.due_days,
            split,
        }
    }

    fn due_date(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(u64::from(self.due_days)))
            .unwrap_or(today)
    }
}

/// Creates orders and keeps them in sync with the payment gateway.
#[derive(Clone)]
pub struct OrderService {
    rest: RestClient,
    asaas: AsaasClient,
    settings: ChargeSettings,
    idempotency: IdempotencyCache,
}

impl OrderService {
    /// Create an order service.
    #[must_use]
    pub fn new(rest: RestClient, asaas: AsaasClient, config: &AsaasConfig) -> Self {
        Self {
            rest,
            asaas,
            settings: ChargeSettings::from_config(config),
            idempotency: IdempotencyCache::default(),
        }
    }

    /// Validate, persist and charge an order.
    ///
    /// A signed-in `user` overrides any `userId` in the payload. With an
    /// idempotency key, repeating the request returns the original order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for bad payloads, `IdempotencyConflict`
    /// when the key was used for another body, and upstream errors otherwise.
    #[instrument(skip_all, fields(evento_id = %payload.event_id, forma_pagamento = %payload.payment_method))]
    pub async fn create_order(
        &self,
        mut payload: OrderPayload,
        user: Option<&AuthUser>,
        idempotency_key: Option<&str>,
    ) -> Result<OrderId, OrderError> {
        if let Some(user) = user {
            payload.buyer.user_id = Some(user.id.clone());
        }
        payload.validate()?;

        match idempotency_key {
            Some(key) => {
                let fingerprint = serde_json::to_value(&payload).unwrap_or_default();
                self.idempotency
                    .run(key, &fingerprint, self.place_order(&payload, Some(key)))
                    .await
            }
            None => self.place_order(&payload, None).await,
        }
    }

    async fn place_order(&self, payload: &OrderPayload, key: Option<&str>) -> Result<OrderId, OrderError> {
        let existing = match key {
            Some(key) => self.rest.find_order_by_idempotency_key(key).await?,
            None => None,
        };
        let resumed = existing.is_some();
        let order = match existing {
            Some(order) => {
                ensure_same_order(&order, payload)?;
                order
            }
            None => self.insert_order(payload, key).await?,
        };

        if order.asaas_payment_id.is_some() {
            tracing::info!(pedido_id = %order.id, "Order already charged, replaying");
            return Ok(order.id);
        }

        let payment = self.charge(&order, payload, resumed).await?;
        self.rest.set_payment_id(&order.id, &payment.id).await?;

        tracing::info!(
            pedido_id = %order.id,
            payment_id = %payment.id,
            total = %order.total,
            "Order created"
        );
        Ok(order.id)
    }

    async fn insert_order(&self, payload: &OrderPayload, key: Option<&str>) -> Result<OrderRecord, OrderError> {
        let new_order = NewOrder {
            evento_id: &payload.event_id,
            sessao_id: &payload.session_id,
            itens: &payload.items,
            produtos: &payload.products,
            forma_pagamento: payload.payment_method,
            comprador: &payload.buyer,
            user_id: payload.buyer.user_id.as_ref(),
            cupom_id: payload.coupon_id.as_ref(),
            total: payload.total.rounded(),
            status: OrderStatus::Pendente,
            idempotency_key: key,
        };

        match (self.rest.insert_order(&new_order).await, key) {
            (Ok(order), _) => Ok(order),
            // Another instance inserted the same key first.
            (Err(SupabaseError::Conflict(_)), Some(key)) => {
                let order = self
                    .rest
                    .find_order_by_idempotency_key(key)
                    .await?
                    .ok_or_else(|| SupabaseError::Conflict(format!("idempotency key {key}")))?;
                ensure_same_order(&order, payload)?;
                Ok(order)
            }
            (Err(e), _) => Err(e.into()),
        }
    }

    /// Create the gateway payment for an order.
    ///
    /// Resumed orders may already have a payment whose id was never stored.
    async fn charge(&self, order: &OrderRecord, payload: &OrderPayload, resumed: bool) -> Result<Payment, OrderError> {
        if resumed && let Some(payment) = self.asaas.find_payment_by_reference(order.id.as_str()).await? {
            tracing::info!(pedido_id = %order.id, payment_id = %payment.id, "Reusing existing payment");
            return Ok(payment);
        }

        let (email, cpf) = payload.buyer.validate()?;
        let customer = NewCustomer {
            name: payload.buyer.name.trim(),
            cpf_cnpj: cpf.as_str(),
            email: email.as_str(),
            mobile_phone: payload.buyer.phone.as_deref(),
            notification_disabled: true,
        };
        tracing::debug!(customer = %asaas::redacted_body(&customer), "Resolving Asaas customer");
        let customer = self.asaas.ensure_customer(&customer).await?;

        let payment = NewPayment {
            customer: customer.id,
            billing_type: payload.payment_method.into(),
            value: order.total,
            due_date: self.settings.due_date(Utc::now().date_naive()),
            description: format!("Pedido {}", order.id),
            external_reference: order.id.to_string(),
            split: self.settings.split.clone().into_iter().collect(),
        };
        Ok(self.asaas.create_payment(&payment).await?)
    }

    /// Look up how the buyer should pay an order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for unknown orders and
    /// `OrderError::PaymentPending` when no payment exists yet.
    #[instrument(skip(self))]
    pub async fn payment_instructions(&self, order_id: &OrderId) -> Result<PaymentInstructions, OrderError> {
        let order = self
            .rest
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.clone()))?;
        let payment_id = order
            .asaas_payment_id
            .as_deref()
            .ok_or_else(|| OrderError::PaymentPending(order.id.clone()))?;

        let detail = match order.forma_pagamento {
            PaymentMethod::Pix => PaymentDetail::Pix(self.asaas.pix_qr_code(payment_id).await?),
            PaymentMethod::Boleto => {
                let payment = self.asaas.get_payment(payment_id).await?;
                let url = payment
                    .bank_slip_url
                    .or(payment.invoice_url)
                    .ok_or_else(|| OrderError::PaymentPending(order.id.clone()))?;
                PaymentDetail::Boleto { url }
            }
            PaymentMethod::CartaoCredito | PaymentMethod::CartaoDebito => {
                let payment = self.asaas.get_payment(payment_id).await?;
                let url = payment
                    .invoice_url
                    .ok_or_else(|| OrderError::PaymentPending(order.id.clone()))?;
                PaymentDetail::Cartao { url }
            }
        };

        Ok(PaymentInstructions {
            order_id: order.id,
            status: order.status,
            payment_method: order.forma_pagamento,
            total: order.total,
            detail,
        })
    }

    /// Apply a gateway notification to the order it references.
    ///
    /// Unknown events and orders are ignored so the gateway stops retrying.
    ///
    /// # Errors
    ///
    /// Returns error if the order cannot be read or updated.
    #[instrument(skip_all, fields(event = %event.event))]
    pub async fn apply_webhook(&self, event: &WebhookEvent) -> Result<WebhookOutcome, OrderError> {
        let Some(status) = event.order_status() else {
            return Ok(WebhookOutcome::Ignored("event not handled"));
        };
        let Some(reference) = event
            .payment
            .as_ref()
            .and_then(|payment| payment.external_reference.as_deref())
        else {
            return Ok(WebhookOutcome::Ignored("payment has no external reference"));
        };

        let order_id = OrderId::new(reference);
        let Some(order) = self.rest.get_order(&order_id).await? else {
            tracing::warn!(pedido_id = %order_id, "Webhook for unknown order");
            return Ok(WebhookOutcome::Ignored("unknown order"));
        };
        if order.status == status {
            return Ok(WebhookOutcome::Ignored("status unchanged"));
        }
        if order.status.is_terminal() {
            tracing::warn!(pedido_id = %order_id, current = ?order.status, next = ?status, "Ignoring update of final order");
            return Ok(WebhookOutcome::Ignored("order is final"));
        }

        self.rest.update_status(&order_id, status).await?;
        tracing::info!(pedido_id = %order_id, status = ?status, "Order status updated");
        Ok(WebhookOutcome::Updated { order_id, status })
    }
}

/// A resumed order must describe the same purchase as the retry.
fn ensure_same_order(order: &OrderRecord, payload: &OrderPayload) -> Result<(), OrderError> {
    let same = order.evento_id == payload.event_id
        && order.sessao_id == payload.session_id
        && order.forma_pagamento == payload.payment_method
        && order.total == payload.total.rounded();
    if same {
        Ok(())
    } else {
        Err(OrderError::IdempotencyConflict)
    }
}
