//! # Synapse
//!
//! Capture web content, tag it into segments, and find it again with
//! hybrid fuzzy, semantic, and temporal ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │   Capture   │──▶│ Classify+Resolve │──▶│  SQLite  │
//! │ (extension) │   │   (N segments)   │   │ content  │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!                      ┌────────────────────────┤
//!                      ▼                        ▼
//!                ┌──────────┐           ┌──────────────┐
//!                │   CLI    │           │ HTTP + SSE   │
//!                │(synapse) │           │  (axum)      │
//!                └──────────┘           └──────────────┘
//! ```
//!
//! Pure ranking, parsing, and classification rules live in `synapse-core`.
//! This crate wires them to storage, remote services, and the outer surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite content store and embedding cache |
//! | [`embedding`] | OpenAI embedding client |
//! | [`classifier`] | OpenAI classification client |
//! | [`capture`] | Capture pipeline |
//! | [`search`] | Search orchestration |
//! | [`notify`] | Live-update broadcast |
//! | [`services`] | Service wiring |
//! | [`server`] | HTTP server |

pub mod capture;
pub mod classifier;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod migrate;
pub mod notify;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;
