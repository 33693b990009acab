//! Caching proxy for STNS identity lookups.
//!
//! Requests arrive over a unix domain socket, are answered from an in-memory
//! cache when possible, and otherwise forwarded to the configured STNS origin.
//! A failure lockout keeps a down origin from being hammered, and a background
//! prefetcher seeds per-record entries from the full user and group listings.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod upstream;
