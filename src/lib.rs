//! # Match Tracker
//!
//! A local match history cache for League of Legends players.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (ids, match records, cache state)
//! - **source**: Upstream API client and the traits the coordinator uses
//! - **storage**: Per-player cache persistence (JSON file, JSONL rows, memory)
//! - **coordinator**: Incremental refresh of a player's cached matches
//! - **calculate**: Player summaries and champion statistics
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod source;
pub mod storage;

pub use models::*;
