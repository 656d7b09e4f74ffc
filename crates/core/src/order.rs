//! Order payload wire format and validation.
//!
//! The JSON field names are Portuguese because the order endpoint is shared
//! with the web checkout (`eventoId`, `itensCarrinho`, `dadosComprador`...).
//! Rust field names stay in English and are renamed on the wire.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{
    CouponId, Cpf, CpfError, Email, EmailError, EventId, EventSessionId, Money, OrderId,
    PaymentMethod, ProductId, TicketTypeId, UserId,
};

/// Reasons an order cannot be submitted.
///
/// The `Display` output is the message shown to the buyer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Preencha nome, email e CPF do comprador")]
    MissingBuyerFields,

    #[error("Email inválido")]
    InvalidEmail(#[source] EmailError),

    #[error("CPF inválido: informe os 11 dígitos")]
    InvalidCpf(#[source] CpfError),

    #[error("Evento ou sessão não informados")]
    MissingEvent,

    #[error("Seu carrinho está vazio")]
    EmptyCart,

    #[error("Quantidade inválida para {0}")]
    InvalidQuantity(String),

    #[error("Preço inválido para {0}")]
    NegativePrice(String),

    #[error("Valor do pedido fora do limite permitido")]
    AmountOutOfRange,

    #[error("Total do pedido não confere (esperado {expected}, recebido {found})")]
    TotalMismatch {
        expected: Money,
        found: Money,
    },
}

impl ValidationError {
    /// Short machine-readable code, used in API error details.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingBuyerFields => "missing_buyer_fields",
            Self::InvalidEmail(_) => "invalid_email",
            Self::InvalidCpf(_) => "invalid_cpf",
            Self::MissingEvent => "missing_event",
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::NegativePrice(_) => "negative_price",
            Self::AmountOutOfRange => "amount_out_of_range",
            Self::TotalMismatch { .. } => "total_mismatch",
        }
    }
}

/// A ticket line in the cart (`itensCarrinho[]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(rename = "ingressoId")]
    pub ticket_type_id: TicketTypeId,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "quantidade")]
    pub quantity: u32,
    #[serde(rename = "preco")]
    pub unit_price: Money,
}

/// An add-on product line (`produtos[]`), e.g. parking or merchandise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLine {
    #[serde(rename = "produtoId")]
    pub product_id: ProductId,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "quantidade")]
    pub quantity: u32,
    #[serde(rename = "preco")]
    pub unit_price: Money,
}

/// Buyer identity (`dadosComprador`).
///
/// Email and CPF travel as typed-in strings; [`BuyerData::validate`] turns
/// them into checked values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerData {
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    pub cpf: String,
    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl BuyerData {
    /// Check the required buyer fields.
    ///
    /// Name, email and CPF must be non-blank; the email must parse and the
    /// CPF must contain exactly 11 digits once punctuation is removed.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(Email, Cpf), ValidationError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.cpf.trim().is_empty()
        {
            return Err(ValidationError::MissingBuyerFields);
        }
        let cpf = Cpf::parse(&self.cpf).map_err(ValidationError::InvalidCpf)?;
        let email = Email::parse(&self.email).map_err(ValidationError::InvalidEmail)?;
        Ok((email, cpf))
    }
}

/// Body of `POST /api/pedidos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    #[serde(rename = "eventoId")]
    pub event_id: EventId,
    #[serde(rename = "sessaoId")]
    pub session_id: EventSessionId,
    #[serde(rename = "itensCarrinho")]
    pub items: Vec<CartItem>,
    #[serde(rename = "produtos", default)]
    pub products: Vec<ProductLine>,
    #[serde(rename = "formaPagamento")]
    pub payment_method: PaymentMethod,
    #[serde(rename = "dadosComprador")]
    pub buyer: BuyerData,
    #[serde(rename = "cupomId", default)]
    pub coupon_id: Option<CouponId>,
    pub total: Money,
}

impl OrderPayload {
    /// Sum of ticket and product lines, before any coupon.
    ///
    /// `None` when a line or the sum overflows.
    #[must_use]
    pub fn subtotal(&self) -> Option<Money> {
        let lines = self
            .items
            .iter()
            .map(|i| i.unit_price.checked_mul(i.quantity))
            .chain(self.products.iter().map(|p| p.unit_price.checked_mul(p.quantity)))
            .collect::<Option<Vec<_>>>()?;
        Money::checked_sum(lines).map(Money::rounded)
    }

    /// Validate the whole payload.
    ///
    /// Without a coupon the total must equal the subtotal; with a coupon it
    /// must lie between zero and the subtotal (the discount itself is
    /// resolved server-side).
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(Email, Cpf), ValidationError> {
        let checked = self.buyer.validate()?;

        if self.event_id.is_blank() || self.session_id.is_blank() {
            return Err(ValidationError::MissingEvent);
        }
        if self.items.is_empty() {
            return Err(ValidationError::EmptyCart);
        }

        let lines = self
            .items
            .iter()
            .map(|i| (&i.name, i.quantity, i.unit_price))
            .chain(self.products.iter().map(|p| (&p.name, p.quantity, p.unit_price)));
        for (name, quantity, price) in lines {
            if quantity == 0 {
                return Err(ValidationError::InvalidQuantity(name.clone()));
            }
            if price.is_negative() {
                return Err(ValidationError::NegativePrice(name.clone()));
            }
        }

        let subtotal = self.subtotal().ok_or(ValidationError::AmountOutOfRange)?;
        let total = self.total.rounded();
        let consistent = if self.coupon_id.is_some() {
            !total.is_negative() && total <= subtotal
        } else {
            total == subtotal
        };
        if !consistent {
            return Err(ValidationError::TotalMismatch {
                expected: subtotal,
                found: total,
            });
        }

        Ok(checked)
    }
}

/// Response of `POST /api/pedidos`.
///
/// `pedidoId` is accepted as either a JSON string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(
        rename = "pedidoId",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OrderResponse {
    /// A successful response for the given order.
    #[must_use]
    pub fn created(order_id: OrderId) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            error: None,
            details: None,
        }
    }

    /// A failed response with a user-facing message.
    #[must_use]
    pub fn failure(error: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            order_id: None,
            error: Some(error.into()),
            details,
        }
    }

    /// The order id, if the response confirms a created order.
    #[must_use]
    pub fn confirmed_order(&self) -> Option<&OrderId> {
        if self.success {
            self.order_id.as_ref().filter(|id| !id.is_blank())
        } else {
            None
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<OrderId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(OrderId::new(s))),
        Some(serde_json::Value::Number(n)) => Ok(Some(OrderId::new(n.to_string()))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "pedidoId must be a string or number, got {other}"
        ))),
    }
}
