//! Checkout orchestrator against a running marketplace.
//!
//! Supabase and Asaas are mocked; the order endpoint, idempotency handling
//! and HTTP transport are the real ones.

#![allow(clippy::unwrap_used)]

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use ingresso_core::{
    CartItem, EventId, EventSessionId, Money, OrderId, PaymentMethod, TicketTypeId,
};
use ingresso_integration_tests::{ORDER_ID, TestApp, session, session_cookie};
use ingresso_marketplace::checkout::{
    CheckoutError, CheckoutForm, CheckoutOrchestrator, CheckoutPhase, HttpOrderTransport,
    OrderTransport,
};

fn form(payment_method: PaymentMethod) -> CheckoutForm {
    CheckoutForm {
        event_id: EventId::new("ev-1"),
        session_id: EventSessionId::new("se-1"),
        items: vec![CartItem {
            ticket_type_id: TicketTypeId::new("inteira"),
            name: "Inteira".to_string(),
            quantity: 2,
            unit_price: Money::from_centavos(5_000),
        }],
        products: vec![],
        payment_method,
        buyer_name: "Ana Souza".to_string(),
        buyer_email: "ana@example.com".to_string(),
        buyer_cpf: "123.456.789-09".to_string(),
        buyer_phone: None,
        user_id: None,
        coupon: None,
    }
}

#[tokio::test]
async fn test_checkout_redirects_to_pix_page() {
    let app = TestApp::spawn().await;
    app.mount_order_backend().await;
    let orchestrator = CheckoutOrchestrator::new(HttpOrderTransport::new(&app.base_url).unwrap());

    let navigation = orchestrator.submit(&form(PaymentMethod::Pix)).await.unwrap();

    assert_eq!(navigation.order_id, OrderId::new(ORDER_ID));
    assert_eq!(navigation.path, "/pagamento/pix?pedido_id=42");
    assert_eq!(orchestrator.phase(), CheckoutPhase::Redirecting);

    let payments = app.requests_to("POST", "/v3/payments").await;
    assert_eq!(payments.len(), 1);
    let charge: Value = payments[0].body_json().unwrap();
    assert_eq!(charge["externalReference"], ORDER_ID);
    assert_eq!(charge["billingType"], "PIX");
    assert_eq!(charge["value"], json!(100.0));
}

#[tokio::test]
async fn test_card_checkout_redirects_to_card_page() {
    let app = TestApp::spawn().await;
    app.mount_order_backend().await;
    let orchestrator = CheckoutOrchestrator::new(HttpOrderTransport::new(&app.base_url).unwrap());

    let navigation = orchestrator
        .submit(&form(PaymentMethod::CartaoCredito))
        .await
        .unwrap();

    assert_eq!(
        navigation.path,
        "/pagamento/cartao?pedido_id=42&tipo=cartao_credito"
    );
}

#[tokio::test]
async fn test_retry_with_same_key_charges_once() {
    let app = TestApp::spawn().await;
    app.mount_order_backend().await;
    let transport = HttpOrderTransport::new(&app.base_url).unwrap();
    let payload = form(PaymentMethod::Boleto).to_payload();

    let first = transport.submit(&payload, "retry-key-1").await.unwrap();
    let second = transport.submit(&payload, "retry-key-1").await.unwrap();

    assert_eq!(first.status, 201);
    assert_eq!(second.status, 201);
    assert_eq!(first.body, second.body);
    assert_eq!(app.requests_to("POST", "/rest/v1/pedidos").await.len(), 1);
    assert_eq!(app.requests_to("POST", "/v3/payments").await.len(), 1);
}

#[tokio::test]
async fn test_reused_key_with_different_order_is_rejected() {
    let app = TestApp::spawn().await;
    app.mount_order_backend().await;
    let transport = HttpOrderTransport::new(&app.base_url).unwrap();
    let payload = form(PaymentMethod::Boleto).to_payload();
    let mut other = payload.clone();
    other.payment_method = PaymentMethod::Pix;

    transport.submit(&payload, "reused-key").await.unwrap();
    let response = transport.submit(&other, "reused-key").await.unwrap();

    assert_eq!(response.status, 422);
    assert!(!response.body.unwrap().success);
    assert_eq!(app.requests_to("POST", "/v3/payments").await.len(), 1);
}

#[tokio::test]
async fn test_gateway_failure_keeps_key_for_retry() {
    let app = TestApp::spawn().await;
    // The first charge fails, later ones succeed.
    Mock::given(method("POST"))
        .and(path("/v3/payments"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&app.backend)
        .await;
    app.mount_order_backend().await;
    let orchestrator = CheckoutOrchestrator::new(HttpOrderTransport::new(&app.base_url).unwrap());
    let form = form(PaymentMethod::Pix);

    let err = orchestrator.submit(&form).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Rejected { status: 502, .. }));
    assert_eq!(
        err.user_message(),
        "Não foi possível gerar o pagamento. Tente novamente."
    );
    assert_eq!(orchestrator.phase(), CheckoutPhase::Error);

    let navigation = orchestrator.submit(&form).await.unwrap();
    assert_eq!(navigation.order_id, OrderId::new(ORDER_ID));

    let inserts = app.requests_to("POST", "/rest/v1/pedidos").await;
    let keys: Vec<Value> = inserts
        .iter()
        .map(|r| r.body_json::<Value>().unwrap()["idempotency_key"].clone())
        .collect();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].is_string());
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_local_validation_sends_nothing() {
    let app = TestApp::spawn().await;
    let orchestrator = CheckoutOrchestrator::new(HttpOrderTransport::new(&app.base_url).unwrap());
    let mut form = form(PaymentMethod::Pix);
    form.buyer_cpf = "111".to_string();

    let err = orchestrator.submit(&form).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(_)));
    assert!(app.backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signed_in_buyer_is_attached_to_order() {
    let app = TestApp::spawn().await;
    app.mount_order_backend().await;
    app.mount_user("u-7").await;
    let transport = HttpOrderTransport::new(&app.base_url)
        .unwrap()
        .with_cookie(session_cookie(&session("access-7", 3600)));
    let orchestrator = CheckoutOrchestrator::new(transport);

    orchestrator.submit(&form(PaymentMethod::Pix)).await.unwrap();

    let inserts = app.requests_to("POST", "/rest/v1/pedidos").await;
    let row: Value = inserts[0].body_json().unwrap();
    assert_eq!(row["user_id"], "u-7");
}
