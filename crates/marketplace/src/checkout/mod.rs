//! Checkout orchestration: validate the buyer's form, submit the order once,
//! and pick the confirmation page for the chosen payment method.
//!
//! # Phases
//!
//! ```text
//! Idle -> Validating -> Submitting -> Redirecting
//!             |             |
//!             +-> Error <---+        (Error accepts a new submission)
//! ```
//!
//! A pending flag is raised for the whole submission, so a second
//! `submit` (a double click) is refused instead of creating a second order.
//! The idempotency key survives failed attempts with an unchanged order and
//! is rotated after a success or when the order changes.

mod transport;

pub use transport::{HttpOrderTransport, OrderTransport, TransportError, TransportResponse};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use uuid::Uuid;

use ingresso_core::{
    BuyerData, CartItem, CouponId, EventId, EventSessionId, Money, OrderId, OrderPayload,
    PaymentMethod, ProductLine, UserId, ValidationError,
};

/// Shown when the server gives no usable message.
pub const FALLBACK_ERROR_MESSAGE: &str = "Erro ao processar pedido";

/// Shown when the order endpoint cannot be reached.
pub const CONNECTION_ERROR_MESSAGE: &str =
    "Não foi possível conectar ao servidor. Verifique sua conexão e tente novamente.";

/// Where the checkout is in its lifecycle.
///
/// `Error` lasts until the buyer dismisses it ([`CheckoutOrchestrator::dismiss_error`])
/// or submits again; either way the checkout is back to `Idle` before the
/// next validation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Redirecting,
    Error,
}

/// A coupon applied to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub id: CouponId,
    pub discount: Money,
}

/// Everything the buyer entered on the checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutForm {
    pub event_id: EventId,
    pub session_id: EventSessionId,
    pub items: Vec<CartItem>,
    pub products: Vec<ProductLine>,
    pub payment_method: PaymentMethod,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_cpf: String,
    pub buyer_phone: Option<String>,
    pub user_id: Option<UserId>,
    pub coupon: Option<AppliedCoupon>,
}

impl CheckoutForm {
    /// Build the order payload. The total is the subtotal minus the coupon
    /// discount, never below zero.
    #[must_use]
    pub fn to_payload(&self) -> OrderPayload {
        let mut payload = OrderPayload {
            event_id: self.event_id.clone(),
            session_id: self.session_id.clone(),
            items: self.items.clone(),
            products: self.products.clone(),
            payment_method: self.payment_method,
            buyer: BuyerData {
                name: self.buyer_name.trim().to_owned(),
                email: self.buyer_email.trim().to_owned(),
                cpf: self.buyer_cpf.clone(),
                phone: self.buyer_phone.clone().filter(|p| !p.trim().is_empty()),
                user_id: self.user_id.clone(),
            },
            coupon_id: self.coupon.as_ref().map(|c| c.id.clone()),
            total: Money::ZERO,
        };
        let discount = self.coupon.as_ref().map_or(Money::ZERO, |c| c.discount);
        // An overflowing subtotal leaves the total at zero; validation
        // rejects the payload before it is sent.
        if let Some(subtotal) = payload.subtotal() {
            payload.total = subtotal.saturating_sub(discount).rounded();
        }
        payload
    }
}

/// Where the buyer goes after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub order_id: OrderId,
    /// Confirmation page path, e.g. `/pagamento/pix?pedido_id=42`.
    pub path: String,
}

/// Why a submission did not produce an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Another submission is still in flight.
    #[error("A submission is already in progress")]
    AlreadySubmitting,

    /// The form failed local validation; nothing was sent.
    #[error("Invalid checkout form: {0}")]
    Validation(#[from] ValidationError),

    /// The server answered without confirming an order.
    #[error("Order rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CheckoutError {
    /// Message to show the buyer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadySubmitting => "Seu pedido já está sendo processado".to_string(),
            Self::Validation(err) => err.to_string(),
            Self::Rejected { message, .. } => message.clone(),
            Self::Transport(_) => CONNECTION_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Key and body of the last unconfirmed attempt.
#[derive(Debug)]
struct Attempt {
    key: String,
    payload: OrderPayload,
}

/// Drives one checkout page.
pub struct CheckoutOrchestrator<T> {
    transport: T,
    pending: AtomicBool,
    phase: Mutex<CheckoutPhase>,
    attempt: Mutex<Option<Attempt>>,
}

/// Lowers the pending flag when the submission ends, even if the caller
/// drops the future.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: OrderTransport> CheckoutOrchestrator<T> {
    /// Create an orchestrator in the `Idle` phase.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending: AtomicBool::new(false),
            phase: Mutex::new(CheckoutPhase::Idle),
            attempt: Mutex::new(None),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> CheckoutPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while a submission is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Validate and submit the form.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::AlreadySubmitting` without side effects while
    /// another submission is in flight. Other errors leave the orchestrator
    /// in the `Error` phase, ready for another attempt.
    pub async fn submit(&self, form: &CheckoutForm) -> Result<Navigation, CheckoutError> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Ignoring submit while another is pending");
            return Err(CheckoutError::AlreadySubmitting);
        }
        let _pending = PendingGuard(&self.pending);

        self.dismiss_error();
        self.set_phase(CheckoutPhase::Validating);
        let payload = form.to_payload();
        if let Err(e) = payload.validate() {
            self.set_phase(CheckoutPhase::Error);
            return Err(e.into());
        }

        self.set_phase(CheckoutPhase::Submitting);
        let key = self.idempotency_key_for(&payload);
        let result = self.transport.submit(&payload, &key).await;

        match interpret(result) {
            Ok(order_id) => {
                self.attempt
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let path = payload.payment_method.confirmation_path(&order_id);
                tracing::info!(pedido_id = %order_id, path = %path, "Order confirmed");
                self.set_phase(CheckoutPhase::Redirecting);
                Ok(Navigation { order_id, path })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Order submission failed");
                self.set_phase(CheckoutPhase::Error);
                Err(e)
            }
        }
    }

    /// Leave the `Error` phase for `Idle`. Other phases are untouched.
    pub fn dismiss_error(&self) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == CheckoutPhase::Error {
            *phase = CheckoutPhase::Idle;
        }
    }

        fn set_phase(&self, phase: CheckoutPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Reuse the key of the last failed attempt if the order is unchanged.
    fn idempotency_key_for(&self, payload: &OrderPayload) -> String {
        let mut attempt = self.attempt.lock().unwrap_or_else(PoisonError::into_inner);
        match attempt.as_ref() {
            Some(previous) if previous.payload == *payload => previous.key.clone(),
            _ => {
                let key = Uuid::new_v4().to_string();
                *attempt = Some(Attempt {
                    key: key.clone(),
                    payload: payload.clone(),
                });
                key
            }
        }
    }
}

/// Turn the endpoint's answer into an order id or a buyer-facing error.
fn interpret(result: Result<TransportResponse, TransportError>) -> Result<OrderId, CheckoutError> {
    let response = result?;
    let success_status = (200..300).contains(&response.status);

    if success_status
        && let Some(order_id) = response.body.as_ref().and_then(|b| b.confirmed_order())
    {
        return Ok(order_id.clone());
    }

    let message = response
        .body
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
    Err(CheckoutError::Rejected {
        status: response.status,
        message,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use ingresso_core::{OrderResponse, TicketTypeId};

    use super::*;

    pub(crate) fn form() -> CheckoutForm {
        CheckoutForm {
            event_id: EventId::new("ev-1"),
            session_id: EventSessionId::new("se-1"),
            items: vec![CartItem {
                ticket_type_id: TicketTypeId::new("inteira"),
                name: "Inteira".to_string(),
                quantity: 2,
                unit_price: Money::from_centavos(5_000),
            }],
            products: vec![ProductLine {
                product_id: ingresso_core::ProductId::new("estac"),
                name: "Estacionamento".to_string(),
                quantity: 1,
                unit_price: Money::from_centavos(2_000),
            }],
            payment_method: PaymentMethod::Pix,
            buyer_name: " Ana Souza ".to_string(),
            buyer_email: "ana@example.com".to_string(),
            buyer_cpf: "123.456.789-09".to_string(),
            buyer_phone: Some(String::new()),
            user_id: None,
            coupon: None,
        }
    }

    pub(crate) fn payload() -> OrderPayload {
        form().to_payload()
    }

    /// Scripted transport recording every call.
    #[derive(Default)]
    struct FakeTransport {
        responses: Mutex<Vec<Result<TransportResponse, TransportError>>>,
        keys: Mutex<Vec<String>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeTransport {
        fn answering(responses: Vec<Result<TransportResponse, TransportError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                ..Self::default()
            }
        }

        fn keys(&self) -> Vec<String> {
            self.keys.lock().unwrap().clone()
        }
    }

    impl OrderTransport for FakeTransport {
        async fn submit(
            &self,
            _payload: &OrderPayload,
            idempotency_key: &str,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys.lock().unwrap().push(idempotency_key.to_owned());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(created("1")))
        }
    }

    fn created(id: &str) -> TransportResponse {
        TransportResponse {
            status: 201,
            body: Some(OrderResponse::created(OrderId::new(id))),
        }
    }

    fn failed(status: u16, error: Option<&str>) -> TransportResponse {
        TransportResponse {
            status,
            body: Some(OrderResponse {
                success: false,
                order_id: None,
                error: error.map(str::to_owned),
                details: None,
            }),
        }
    }

    #[test]
    fn test_total_applies_coupon_and_clamps() {
        let mut form = form();
        assert_eq!(form.to_payload().total, Money::from_centavos(12_000));

        form.coupon = Some(AppliedCoupon {
            id: CouponId::new("DESC20"),
            discount: Money::from_centavos(2_000),
        });
        assert_eq!(form.to_payload().total, Money::from_centavos(10_000));

        form.coupon = Some(AppliedCoupon {
            id: CouponId::new("GRATIS"),
            discount: Money::from_centavos(50_000),
        });
        let payload = form.to_payload();
        assert_eq!(payload.total, Money::ZERO);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_payload_trims_buyer_and_drops_blank_phone() {
        let payload = form().to_payload();
        assert_eq!(payload.buyer.name, "Ana Souza");
        assert_eq!(payload.buyer.phone, None);
    }

    #[tokio::test]
    async fn test_success_navigates_to_confirmation_page() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![Ok(created("42"))]));

        let navigation = orchestrator.submit(&form()).await.unwrap();

        assert_eq!(navigation.path, "/pagamento/pix?pedido_id=42");
        assert_eq!(navigation.order_id.as_str(), "42");
        assert_eq!(orchestrator.phase(), CheckoutPhase::Redirecting);
        assert!(!orchestrator.is_pending());
    }

    #[tokio::test]
    async fn test_card_navigation_carries_card_type() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![Ok(created("9"))]));
        let mut form = form();
        form.payment_method = PaymentMethod::CartaoDebito;

        let navigation = orchestrator.submit(&form).await.unwrap();

        assert_eq!(navigation.path, "/pagamento/cartao?pedido_id=9&tipo=cartao_debito");
    }

    #[tokio::test]
    async fn test_invalid_cpf_sends_nothing() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::default());
        let mut form = form();
        form.buyer_cpf = "123.456.789".to_string();

        let err = orchestrator.submit(&form).await.unwrap_err();

        assert!(matches!(err, CheckoutError::Validation(ValidationError::InvalidCpf(_))));
        assert_eq!(orchestrator.transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.phase(), CheckoutPhase::Error);
        assert!(!orchestrator.is_pending());
    }

    #[tokio::test]
    async fn test_overflowing_cart_sends_nothing() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::default());
        let mut form = form();
        form.items[0].unit_price = Money::new(rust_decimal::Decimal::MAX);

        let err = orchestrator.submit(&form).await.unwrap_err();

        assert!(matches!(err, CheckoutError::Validation(ValidationError::AmountOutOfRange)));
        assert_eq!(orchestrator.transport.calls.load(Ordering::SeqCst), 0);
        assert!(!orchestrator.is_pending());
    }

    #[tokio::test]
    async fn test_error_phase_returns_to_idle() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![
            Ok(failed(500, None)),
            Ok(created("5")),
        ]));

        orchestrator.submit(&form()).await.unwrap_err();
        assert_eq!(orchestrator.phase(), CheckoutPhase::Error);

        orchestrator.dismiss_error();
        assert_eq!(orchestrator.phase(), CheckoutPhase::Idle);

        orchestrator.submit(&form()).await.unwrap();
        assert_eq!(orchestrator.phase(), CheckoutPhase::Redirecting);
        orchestrator.dismiss_error();
        assert_eq!(orchestrator.phase(), CheckoutPhase::Redirecting);
    }

    #[tokio::test]
    async fn test_server_error_message_is_surfaced() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![Ok(failed(
            400,
            Some("Ingressos esgotados"),
        ))]));

        let err = orchestrator.submit(&form()).await.unwrap_err();

        assert_eq!(err.user_message(), "Ingressos esgotados");
        assert_eq!(orchestrator.phase(), CheckoutPhase::Error);
    }

    #[tokio::test]
    async fn test_missing_message_falls_back() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![
            Ok(failed(500, None)),
            Ok(TransportResponse {
                status: 502,
                body: None,
            }),
        ]));

        for _ in 0..2 {
            let err = orchestrator.submit(&form()).await.unwrap_err();
            assert_eq!(err.user_message(), FALLBACK_ERROR_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_success_without_order_id_is_an_error() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![Ok(
            TransportResponse {
                status: 200,
                body: Some(OrderResponse {
                    success: true,
                    order_id: None,
                    error: None,
                    details: None,
                }),
            },
        )]));

        let err = orchestrator.submit(&form()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_is_refused() {
        let gate = Arc::new(Notify::new());
        let transport = FakeTransport {
            gate: Some(Arc::clone(&gate)),
            ..FakeTransport::answering(vec![Ok(created("42"))])
        };
        let orchestrator = Arc::new(CheckoutOrchestrator::new(transport));

        let first = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.submit(&form()).await }
        });
        while orchestrator.transport.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(orchestrator.is_pending());
        assert_eq!(orchestrator.phase(), CheckoutPhase::Submitting);
        let second = orchestrator.submit(&form()).await.unwrap_err();
        assert!(matches!(second, CheckoutError::AlreadySubmitting));
        assert_eq!(orchestrator.phase(), CheckoutPhase::Submitting);

        gate.notify_one();
        let navigation = first.await.unwrap().unwrap();
        assert_eq!(navigation.order_id.as_str(), "42");
        assert_eq!(orchestrator.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_reuses_key_until_success() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![
            Ok(failed(502, Some("Gateway indisponível"))),
            Ok(created("42")),
            Ok(created("43")),
        ]));

        orchestrator.submit(&form()).await.unwrap_err();
        orchestrator.submit(&form()).await.unwrap();
        orchestrator.submit(&form()).await.unwrap();

        let keys = orchestrator.transport.keys();
        assert_eq!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
    }

    #[tokio::test]
    async fn test_changed_order_gets_new_key() {
        let orchestrator = CheckoutOrchestrator::new(FakeTransport::answering(vec![
            Ok(failed(500, None)),
            Ok(created("42")),
        ]));

        orchestrator.submit(&form()).await.unwrap_err();
        let mut changed = form();
        changed.payment_method = PaymentMethod::Boleto;
        orchestrator.submit(&changed).await.unwrap();

        let keys = orchestrator.transport.keys();
        assert_ne!(keys[0], keys[1]);
    }
}
