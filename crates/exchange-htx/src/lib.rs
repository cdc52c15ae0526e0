//! HTX (Huobi) spot exchange integration for the SCOA data collector.
//!
//! This crate provides:
//! - REST client with rate limiting for the HTX spot API
//! - HMAC-SHA256 v2 request signing for account endpoints
//! - The HTX implementation of the shared exchange capability set
//!
//! # Authentication
//!
//! HTX signs requests with HMAC-SHA256 over a canonical
//! `method\nhost\npath\nsorted-query` payload, base64-encoded and appended
//! as the `Signature` query parameter. The spot account id is resolved
//! once via `/v1/account/accounts` and cached for the adapter's lifetime.

pub mod adapter;
pub mod client;

pub use adapter::HtxExchange;
pub use client::{HtxClient, HTX_PROD_URL};
