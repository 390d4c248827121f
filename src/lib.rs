//! Pricegate - Gated Price API Service
//!
//! This crate implements a demo cryptocurrency price API built around an
//! explicit request pipeline: a TTL-classed cache store, per-client
//! fixed-window rate limiters, and a rolling metrics aggregator composed
//! around a simulated market data service.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod market;
pub mod metrics;
pub mod pipeline;
pub mod ratelimit;
pub mod records;
pub mod tasks;
