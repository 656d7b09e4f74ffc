//! Ingresso Core - Shared types library.
//!
//! This crate provides common types used across all Ingresso components:
//! - `marketplace` - HTTP server (session gate, order endpoint, webhooks)
//! - `cli` - Terminal checkout client
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Both the checkout client and the order endpoint
//! validate orders with the same rules defined here.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, CPF, money, payment methods
//! - [`order`] - Order payload wire format and validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod order;
pub mod types;

pub use order::{
    BuyerData, CartItem, OrderPayload, OrderResponse, ProductLine, ValidationError,
};
pub use types::*;
