//! Core cryptographic primitives and channel state model for the tollgate
//! off-chain micropayment protocol.
//!
//! This crate is pure: it performs no I/O. It depends on [`tollgate_proto`]
//! for wire-shaped types and builds the domain model (accounts, channels,
//! payment states) and the crypto layer (ECDSA, canonical JSON, PayWord
//! chains, PayTree Merkle commitments) on top of it.
//!
//! # Modules
//!
//! - [`crypto`] — signing, verification, canonical JSON, hash chains, Merkle trees
//! - [`model`] — `Account`, `Channel`, `PaymentState`
//! - [`timestamp`] — Unix-epoch timestamp newtype
//! - [`error`] — the crate's `thiserror` error types

pub mod crypto;
pub mod error;
pub mod model;
pub mod timestamp;

pub use error::CoreError;
pub use timestamp::Timestamp;
