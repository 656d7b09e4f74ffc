//! CLI subcommands.

pub mod checkout;
