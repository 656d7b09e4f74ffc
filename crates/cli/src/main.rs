//! Ingresso CLI - drive the marketplace from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Buy two "inteira" tickets with Pix
//! ingresso checkout \
//!     --base-url http://localhost:3000 \
//!     --evento ev-1 --sessao se-1 \
//!     --item inteira:Inteira:2:50.00 \
//!     --nome "Ana Souza" --email ana@example.com --cpf 123.456.789-09 \
//!     --pagamento pix
//! ```
//!
//! # Commands
//!
//! - `checkout` - Validate and submit an order, then print the confirmation page

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ingresso")]
#[command(author, version, about = "Ingresso marketplace CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an order through the checkout flow
    Checkout(commands::checkout::CheckoutArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingresso=info,ingresso_marketplace=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

#[allow(clippy::print_stdout)]
async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Checkout(args) => {
            let navigation = commands::checkout::run(args).await?;
            println!("{}", navigation.path);
        }
    }
    Ok(())
}
