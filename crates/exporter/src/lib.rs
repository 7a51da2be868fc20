//! Threshold exporter
//!
//! Resolves the tenant threshold config on every scrape and exposes it as
//! `user_threshold` / `user_state_filter` gauges.

pub mod api;
pub mod config;
