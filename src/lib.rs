//! Commerce Engine - request-time serving for affiliate links, ad slots and attribution
//!
//! # Architecture
//! - `services`: ShortLinkResolver, AdTargetingEngine, AttributionLedger,
//!   CommissionCalculator, FraudGuard, SegmentStore and the catalog snapshot
//! - `cache`: existence filter + negative cache + object cache for short links
//! - `events`: buffered click / impression pipeline
//! - `storage`: SeaORM-backed durable store
//! - `api`: HTTP handlers and middleware
//! - `cli`: one-shot administrative commands
//! - `config`, `system`, `runtime`: configuration, logging and lifecycle

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
