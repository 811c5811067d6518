//! ArangoDB HTTP API client.
//!
//! This crate provides:
//! - A thin REST client over ArangoDB's document, index and cursor APIs
//! - Schema bootstrap for the knowledge-graph collections
//! - Seed data for local development
//! - The company/filing queries used by the read-only API endpoints

pub mod client;
pub mod error;
pub mod graph;
pub mod schema;
pub mod seed;

pub use client::{ArangoClient, ArangoConfig};
pub use error::{ArangoError, ArangoResult};
pub use graph::{list_companies, list_filings_for_company};
pub use schema::ensure_schema;
pub use seed::seed_data;
