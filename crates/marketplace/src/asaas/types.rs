//! Asaas v3 request and response bodies.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ingresso_core::{Money, OrderStatus, PaymentMethod};

/// Paginated list envelope (`{"data": [...], "hasMore": ..}`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

/// A customer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cpf_cnpj: Option<String>,
}

/// Body of `POST /customers`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer<'a> {
    pub name: &'a str,
    pub cpf_cnpj: &'a str,
    pub email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<&'a str>,
    /// Asaas e-mails are disabled; the marketplace notifies buyers itself.
    pub notification_disabled: bool,
}

/// How Asaas collects a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    Pix,
    Boleto,
    CreditCard,
    DebitCard,
}

impl From<PaymentMethod> for BillingType {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Pix => Self::Pix,
            PaymentMethod::Boleto => Self::Boleto,
            PaymentMethod::CartaoCredito => Self::CreditCard,
            PaymentMethod::CartaoDebito => Self::DebitCard,
        }
    }
}

/// Share of a payment routed to another wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    pub wallet_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentual_value: Decimal,
}

/// Body of `POST /payments`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub customer: String,
    pub billing_type: BillingType,
    pub value: Money,
    pub due_date: NaiveDate,
    pub description: String,
    pub external_reference: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub split: Vec<Split>,
}

/// A payment (charge).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub value: Option<Money>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub bank_slip_url: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// PIX QR code for a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixQrCode {
    /// PNG image, base64-encoded.
    pub encoded_image: String,
    /// Copy-and-paste code.
    pub payload: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
}

/// Webhook notification body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub payment: Option<Payment>,
}

impl WebhookEvent {
    /// Order status implied by this event, if it changes one.
    #[must_use]
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self.event.as_str() {
            "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED" => Some(OrderStatus::Pago),
            "PAYMENT_OVERDUE" => Some(OrderStatus::Vencido),
            "PAYMENT_REFUNDED" => Some(OrderStatus::Estornado),
            "PAYMENT_DELETED" => Some(OrderStatus::Cancelado),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrors {
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
