//! Vendor HTTP server: streaming payment acceptance and settlement for the
//! tollgate micropayment protocol.
//!
//! # Modules
//!
//! - [`config`] — configuration types and loading
//! - [`error`] — the HTTP-facing error type and its response mapping
//! - [`issuer_client`] — HTTP client for the issuer's channel and settlement endpoints
//! - [`handlers`] — axum route handlers and router assembly
//! - [`service`] — vendor business logic, independent of HTTP

pub mod config;
pub mod error;
pub mod handlers;
pub mod issuer_client;
pub mod service;
