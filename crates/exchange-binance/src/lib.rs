//! Binance spot exchange integration for the SCOA data collector.
//!
//! This crate provides:
//! - REST client with rate limiting for the Binance spot API
//! - HMAC-SHA256 request signing for account endpoints
//! - The Binance implementation of the shared exchange capability set
//!
//! # Authentication
//!
//! Binance signs requests with HMAC-SHA256 over the query string and sends
//! the API key in the `X-MBX-APIKEY` header. Credentials come from the
//! per-exchange configuration; the adapter reports itself disabled while
//! either credential is empty.

pub mod adapter;
pub mod client;

pub use adapter::BinanceExchange;
pub use client::{BinanceClient, BINANCE_PROD_URL, BINANCE_TESTNET_URL};
