//! # Passkey Wallet
//!
//! Biometric signing for ERC-4337 v0.6 smart accounts owned by WebAuthn P-256 credentials.
//!
//! A [`wallet::Wallet`] registers a passkey, derives the counterfactual account it owns, and
//! executes batches of calls through a bundler. Every call target is checked against the
//! [`allowlist::Allowlist`] before anything is built or signed.

pub mod account;
pub mod allowlist;
pub mod builder;
pub mod bundler;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod hash;
pub mod provider;
pub mod serde;
pub mod signers;
pub mod storage;
pub mod types;
pub mod wallet;
pub mod webauthn;
