//! Livreo payment lifecycle backend
//!
//! The order/contribution payment subsystem of the Livreo online bookstore:
//! session tokens, rate limiting, the order and contribution state machines,
//! the three payment-provider adapters, the idempotent reconciliation
//! ledger, and the crowdfunding snapshot stream.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
