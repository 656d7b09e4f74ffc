//! Payment methods and their confirmation pages.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderId;

/// Error returned when parsing an unknown payment method tag.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown payment method: {0} (expected pix, boleto, cartao_credito or cartao_debito)")]
pub struct PaymentMethodError(pub String);

/// Payment method chosen at checkout (`formaPagamento` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Boleto,
    CartaoCredito,
    CartaoDebito,
}

impl PaymentMethod {
    /// All methods, in display order.
    pub const ALL: [Self; 4] = [
        Self::Pix,
        Self::Boleto,
        Self::CartaoCredito,
        Self::CartaoDebito,
    ];

    /// Wire tag (`pix`, `boleto`, `cartao_credito`, `cartao_debito`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::Boleto => "boleto",
            Self::CartaoCredito => "cartao_credito",
            Self::CartaoDebito => "cartao_debito",
        }
    }

    /// Returns true for credit and debit cards.
    #[must_use]
    pub const fn is_card(&self) -> bool {
        matches!(self, Self::CartaoCredito | Self::CartaoDebito)
    }

    /// Path of the confirmation page for an order paid with this method.
    ///
    /// Card payments share one page and carry the card type as `tipo`.
    ///
    /// ```
    /// use ingresso_core::{OrderId, PaymentMethod};
    ///
    /// let id = OrderId::new("7");
    /// assert_eq!(PaymentMethod::Pix.confirmation_path(&id), "/pagamento/pix?pedido_id=7");
    /// assert_eq!(
    ///     PaymentMethod::CartaoCredito.confirmation_path(&id),
    ///     "/pagamento/cartao?pedido_id=7&tipo=cartao_credito",
    /// );
    /// ```
    #[must_use]
    pub fn confirmation_path(&self, order_id: &OrderId) -> String {
        let id = urlencoding::encode(order_id.as_str());
        match self {
            Self::Pix => format!("/pagamento/pix?pedido_id={id}"),
            Self::Boleto => format!("/pagamento/boleto?pedido_id={id}"),
            Self::CartaoCredito | Self::CartaoDebito => {
                format!("/pagamento/cartao?pedido_id={id}&tipo={}", self.as_str())
            }
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| PaymentMethodError(s.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_paths() {
        let id = OrderId::new("123");
        assert_eq!(
            PaymentMethod::Pix.confirmation_path(&id),
            "/pagamento/pix?pedido_id=123"
        );
        assert_eq!(
            PaymentMethod::Boleto.confirmation_path(&id),
            "/pagamento/boleto?pedido_id=123"
        );
        assert_eq!(
            PaymentMethod::CartaoDebito.confirmation_path(&id),
            "/pagamento/cartao?pedido_id=123&tipo=cartao_debito"
        );
    }

    #[test]
    fn test_confirmation_path_encodes_id() {
        let id = OrderId::new("a b&c");
        assert_eq!(
            PaymentMethod::Pix.confirmation_path(&id),
            "/pagamento/pix?pedido_id=a%20b%26c"
        );
    }

    #[test]
    fn test_wire_tags_match_serde() {
        for method in PaymentMethod::ALL {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_from_str_unknown() {
        assert_eq!(
            "credit_card".parse::<PaymentMethod>(),
            Err(PaymentMethodError("credit_card".to_string()))
        );
    }
}
