//! Order status.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order (`pedidos.status`).
///
/// Orders are created `Pendente` and move to a terminal state when the
/// payment gateway reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pendente,
    Pago,
    Vencido,
    Estornado,
    Cancelado,
}

impl OrderStatus {
    /// Returns true if no further payment events should change the status.
    ///
    /// `Pago` is not terminal because a paid order can still be refunded.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Estornado | Self::Cancelado)
    }
}
