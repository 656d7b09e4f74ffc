//! Checkout submission from the command line.
//!
//! Builds the same form the checkout page builds and submits it through
//! [`CheckoutOrchestrator`], so the order goes through validation and the
//! idempotency key handling a browser checkout gets.
//!
//! # Environment Variables
//!
//! - `INGRESSO_BASE_URL` - Marketplace base URL (default `http://localhost:3000`)
//! - `INGRESSO_COOKIE` - `Cookie` header carrying a Supabase session

use std::str::FromStr;

use clap::Args;
use reqwest::header::HeaderValue;
use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

use ingresso_core::{
    CartItem, CouponId, EventId, EventSessionId, Money, PaymentMethod, ProductId, ProductLine,
    TicketTypeId, UserId,
};
use ingresso_marketplace::checkout::{
    AppliedCoupon, CheckoutError, CheckoutForm, CheckoutOrchestrator, HttpOrderTransport,
    Navigation, TransportError,
};

/// Errors from the checkout command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A `--item`/`--produto` value is not `id:nome:qtd:preco`.
    #[error("Invalid line {0:?}: expected id:nome:qtd:preco")]
    InvalidLine(String),

    /// The cookie cannot be sent as a header.
    #[error("Invalid cookie header")]
    InvalidCookie,

    /// The transport could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The checkout did not produce an order.
    #[error("{}", .0.user_message())]
    Checkout(#[from] CheckoutError),
}

/// One cart line given on the command line as `id:nome:qtd:preco`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineArg {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl FromStr for LineArg {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CommandError::InvalidLine(s.to_owned());
        // The name sits between the id and the trailing numbers, so it may
        // contain colons.
        let (id, rest) = s.split_once(':').ok_or_else(invalid)?;
        let mut tail = rest.rsplitn(3, ':');
        let (Some(price), Some(quantity), Some(name)) = (tail.next(), tail.next(), tail.next())
        else {
            return Err(invalid());
        };
        if id.trim().is_empty() {
            return Err(invalid());
        }
        let quantity = quantity.trim().parse().map_err(|_| invalid())?;
        let unit_price = Decimal::from_str(price.trim().replace(',', ".").as_str())
            .map_err(|_| invalid())?;
        Ok(Self {
            id: id.trim().to_owned(),
            name: name.trim().to_owned(),
            quantity,
            unit_price: Money::new(unit_price),
        })
    }
}

fn parse_line(s: &str) -> Result<LineArg, String> {
    s.parse().map_err(|e: CommandError| e.to_string())
}

fn parse_payment_method(s: &str) -> Result<PaymentMethod, String> {
    s.parse().map_err(|e: ingresso_core::PaymentMethodError| e.to_string())
}

fn parse_amount(s: &str) -> Result<Money, String> {
    Decimal::from_str(&s.replace(',', "."))
        .map(Money::new)
        .map_err(|e| e.to_string())
}

/// Arguments of `ingresso checkout`.
#[derive(Debug, Args)]
pub struct CheckoutArgs {
    /// Marketplace base URL
    #[arg(long, env = "INGRESSO_BASE_URL", default_value = "http://localhost:3000")]
    pub base_url: Url,

    /// Event id
    #[arg(long)]
    pub evento: String,

    /// Event session id
    #[arg(long)]
    pub sessao: String,

    /// Ticket line `id:nome:qtd:preco` (repeatable)
    #[arg(long = "item", value_parser = parse_line)]
    pub items: Vec<LineArg>,

    /// Product line `id:nome:qtd:preco` (repeatable)
    #[arg(long = "produto", value_parser = parse_line)]
    pub products: Vec<LineArg>,

    /// Buyer name
    #[arg(long)]
    pub nome: String,

    /// Buyer email
    #[arg(long)]
    pub email: String,

    /// Buyer CPF, with or without punctuation
    #[arg(long)]
    pub cpf: String,

    /// Buyer phone
    #[arg(long)]
    pub telefone: Option<String>,

    /// Payment method (`pix`, `boleto`, `cartao_credito`, `cartao_debito`)
    #[arg(long, value_parser = parse_payment_method)]
    pub pagamento: PaymentMethod,

    /// Coupon id
    #[arg(long, requires = "desconto")]
    pub cupom: Option<String>,

    /// Coupon discount in reais
    #[arg(long, requires = "cupom", value_parser = parse_amount)]
    pub desconto: Option<Money>,

    /// Buyer's user id, when not signed in through a cookie
    #[arg(long)]
    pub user_id: Option<String>,

    /// `Cookie` header with a Supabase session
    #[arg(long, env = "INGRESSO_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,
}

impl CheckoutArgs {
    /// The checkout form these arguments describe.
    #[must_use]
    pub fn to_form(&self) -> CheckoutForm {
        CheckoutForm {
            event_id: EventId::new(self.evento.as_str()),
            session_id: EventSessionId::new(self.sessao.as_str()),
            items: self
                .items
                .iter()
                .map(|line| CartItem {
                    ticket_type_id: TicketTypeId::new(line.id.as_str()),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            products: self
                .products
                .iter()
                .map(|line| ProductLine {
                    product_id: ProductId::new(line.id.as_str()),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            payment_method: self.pagamento,
            buyer_name: self.nome.clone(),
            buyer_email: self.email.clone(),
            buyer_cpf: self.cpf.clone(),
            buyer_phone: self.telefone.clone(),
            user_id: self.user_id.as_deref().map(UserId::new),
            coupon: self
                .cupom
                .as_deref()
                .zip(self.desconto)
                .map(|(id, discount)| AppliedCoupon {
                    id: CouponId::new(id),
                    discount,
                }),
        }
    }
}

/// Submit the order described by `args`.
///
/// # Errors
///
/// Returns error if the cookie is not a valid header value, the transport
/// cannot be built, or the checkout fails.
pub async fn run(args: CheckoutArgs) -> Result<Navigation, CommandError> {
    let mut transport = HttpOrderTransport::new(&args.base_url)?;
    if let Some(cookie) = args.cookie.as_deref() {
        let value = HeaderValue::from_str(cookie).map_err(|_| CommandError::InvalidCookie)?;
        transport = transport.with_cookie(value);
    }

    let form = args.to_form();
    tracing::info!(
        evento = %form.event_id,
        pagamento = %form.payment_method,
        items = form.items.len(),
        "Submitting order"
    );

    let orchestrator = CheckoutOrchestrator::new(transport);
    let navigation = orchestrator.submit(&form).await?;
    tracing::info!(pedido_id = %navigation.order_id, "Order created");
    Ok(navigation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: CheckoutArgs,
    }

    fn parse(extra: &[&str]) -> Result<CheckoutArgs, clap::Error> {
        let mut argv = vec![
            "ingresso",
            "--base-url",
            "http://localhost:3000",
            "--evento",
            "ev-1",
            "--sessao",
            "se-1",
            "--item",
            "inteira:Inteira:2:50.00",
            "--nome",
            "Ana Souza",
            "--email",
            "ana@example.com",
            "--cpf",
            "123.456.789-09",
            "--pagamento",
            "pix",
        ];
        argv.extend_from_slice(extra);
        TestCli::try_parse_from(argv).map(|cli| cli.args)
    }

    #[test]
    fn test_line_arg() {
        let line: LineArg = "meia:Meia entrada:3:25,50".parse().unwrap();
        assert_eq!(line.id, "meia");
        assert_eq!(line.name, "Meia entrada");
        assert_eq!(line.quantity, 3);
        assert_eq!(line.unit_price, Money::from_centavos(2_550));
    }

    #[test]
    fn test_line_arg_name_keeps_colons() {
        let line: LineArg = "vip:Camarote: Setor A:1:300".parse().unwrap();
        assert_eq!(line.name, "Camarote: Setor A");
        assert_eq!(line.quantity, 1);
        assert!("vip:Camarote:1".parse::<LineArg>().is_err());
        assert!(":Sem id:1:10".parse::<LineArg>().is_err());
        assert!("x:Item:dois:10".parse::<LineArg>().is_err());
    }

    #[test]
    fn test_form_from_args() {
        let args = parse(&["--telefone", "11999990000"]).unwrap();
        let form = args.to_form();
        assert_eq!(form.event_id, EventId::new("ev-1"));
        assert_eq!(form.items.len(), 1);
        assert_eq!(form.items.first().unwrap().quantity, 2);
        assert_eq!(form.payment_method, PaymentMethod::Pix);
        assert_eq!(form.buyer_phone.as_deref(), Some("11999990000"));
        assert!(form.coupon.is_none());
        assert_eq!(form.to_payload().total, Money::from_centavos(10_000));
    }

    #[test]
    fn test_coupon_applies_discount() {
        let args = parse(&["--cupom", "PROMO10", "--desconto", "10"]).unwrap();
        let payload = args.to_form().to_payload();
        assert_eq!(payload.coupon_id, Some(CouponId::new("PROMO10")));
        assert_eq!(payload.total, Money::from_centavos(9_000));
    }

    #[test]
    fn test_coupon_requires_discount() {
        assert!(parse(&["--cupom", "PROMO10"]).is_err());
    }

    #[test]
    fn test_unknown_payment_method() {
        let err = TestCli::try_parse_from([
            "ingresso", "--evento", "e", "--sessao", "s", "--nome", "n", "--email", "e@x.com",
            "--cpf", "1", "--pagamento", "cheque",
        ]);
        assert!(err.is_err());
    }
}
