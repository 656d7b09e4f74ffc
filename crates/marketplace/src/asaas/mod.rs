//! Asaas payment gateway client.
//!
//! Covers the slice of the v3 API the checkout needs: customers, payments
//! and PIX QR codes. Every request carries the `access_token` header.

mod types;

pub use types::{
    BillingType, Customer, ListResponse, NewCustomer, NewPayment, Payment, PixQrCode, Split,
    WebhookEvent,
};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::AsaasConfig;

/// Timeout for calls to Asaas.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Asaas rejects requests without a User-Agent.
const USER_AGENT: &str = concat!("ingresso-marketplace/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur when interacting with Asaas.
#[derive(Debug, Error)]
pub enum AsaasError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Asaas API client.
#[derive(Clone)]
pub struct AsaasClient {
    client: reqwest::Client,
    base_url: Url,
}

impl AsaasClient {
    /// Create a new Asaas API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &AsaasConfig) -> Result<Self, AsaasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "access_token",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| AsaasError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AsaasError> {
        self.base_url
            .join(path)
            .map_err(|e| AsaasError::Parse(format!("Invalid Asaas URL: {e}")))
    }

    /// Find a customer by CPF.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip_all)]
    pub async fn find_customer_by_cpf(&self, cpf: &str) -> Result<Option<Customer>, AsaasError> {
        let request = self
            .client
            .get(self.endpoint("customers")?)
            .query(&[("cpfCnpj", cpf), ("limit", "1")]);
        let customers: ListResponse<Customer> = send(request).await?;
        Ok(customers.data.into_iter().next())
    }

    /// Create a customer.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip_all)]
    pub async fn create_customer(&self, customer: &NewCustomer<'_>) -> Result<Customer, AsaasError> {
        send(self.client.post(self.endpoint("customers")?).json(customer)).await
    }

    /// Return the customer registered under a CPF, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns error if either API request fails.
    pub async fn ensure_customer(&self, customer: &NewCustomer<'_>) -> Result<Customer, AsaasError> {
        if let Some(existing) = self.find_customer_by_cpf(customer.cpf_cnpj).await? {
            tracing::debug!(customer_id = %existing.id, "Reusing Asaas customer");
            return Ok(existing);
        }
        let created = self.create_customer(customer).await?;
        tracing::info!(customer_id = %created.id, "Created Asaas customer");
        Ok(created)
    }

    /// Create a payment.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip_all, fields(external_reference = %payment.external_reference))]
    pub async fn create_payment(&self, payment: &NewPayment) -> Result<Payment, AsaasError> {
        send(self.client.post(self.endpoint("payments")?).json(payment)).await
    }

    /// Find a live payment by its external reference (the order id).
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, AsaasError> {
        let request = self
            .client
            .get(self.endpoint("payments")?)
            .query(&[("externalReference", reference), ("limit", "1")]);
        let payments: ListResponse<Payment> = send(request).await?;
        Ok(payments.data.into_iter().next())
    }

    /// Fetch a payment.
    ///
    /// # Errors
    ///
    /// Returns `AsaasError::NotFound` if the payment does not exist.
    #[instrument(skip(self))]
    pub async fn get_payment(&self, id: &str) -> Result<Payment, AsaasError> {
        let path = format!("payments/{}", urlencoding::encode(id));
        send(self.client.get(self.endpoint(&path)?)).await
    }

    /// Fetch the PIX QR code of a payment.
    ///
    /// # Errors
    ///
    /// Returns `AsaasError::NotFound` if the payment does not exist.
    #[instrument(skip(self))]
    pub async fn pix_qr_code(&self, payment_id: &str) -> Result<PixQrCode, AsaasError> {
        let path = format!("payments/{}/pixQrCode", urlencoding::encode(payment_id));
        send(self.client.get(self.endpoint(&path)?)).await
    }
}

/// Send a request and decode the JSON response, mapping Asaas error bodies.
async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, AsaasError> {
    let response = request.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AsaasError::NotFound(response.url().path().to_owned()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AsaasError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    response
        .json()
        .await
        .map_err(|e| AsaasError::Parse(e.to_string()))
}

/// Join the `errors[].description` entries of an Asaas error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<types::ApiErrors>(body)
        .ok()
        .map(|parsed| {
            parsed
                .errors
                .into_iter()
                .map(|e| match (e.code, e.description) {
                    (Some(code), Some(description)) => format!("{code}: {description}"),
                    (_, Some(description)) => description,
                    (Some(code), None) => code,
                    (None, None) => String::new(),
                })
                .filter(|message| !message.is_empty())
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// JSON form of a request body with buyer identifiers masked, for logs.
#[must_use]
pub fn redacted_body<T: Serialize>(body: &T) -> serde_json::Value {
    let mut value = serde_json::to_value(body).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        for key in ["cpfCnpj", "email", "mobilePhone"] {
            if object.contains_key(key) {
                object.insert(key.to_string(), serde_json::Value::from("[REDACTED]"));
            }
        }
    }
    value
}
