//! # Synapse Core
//!
//! Runtime-free logic for Synapse: content models, temporal query parsing,
//! classification fallback and segment resolution, fuzzy matching, vector
//! utilities, rank fusion, and the storage trait.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. The
//! `synapse` app crate supplies the SQLite store, the remote embedding and
//! classification clients, and the async search orchestrator.

pub mod classify;
pub mod embedding;
pub mod fuzzy;
pub mod media;
pub mod models;
pub mod notify;
pub mod search;
pub mod segments;
pub mod store;
pub mod temporal;
