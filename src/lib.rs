//! Combinator - Multi-Backend Data-Access Gateway
//!
//! One HTTP endpoint fronting a dynamically configured set of named
//! storage backends: relational databases (RDB), key-value stores (KV),
//! and object stores (S3). Clients address a backend by ID via a header;
//! the gateway dispatches to the live handle, translating SQL dialects
//! where needed and hot-reloading backend sets without dropping in-flight
//! requests.
//!
//! # Architecture
//!
//! - **Family gateways**: per-family routing, typed envelopes, live
//!   `id -> handle` maps ([`rdb`], [`kv`], [`s3`])
//! - **Reload engine**: atomic diffing of configurations with handle reuse
//!   ([`backend`])
//! - **SQL translation core**: parse, classify, shim, validate, execute
//!   ([`rdb`])
//! - **Monitor plane**: a JSON-RPC subset for operators ([`gateway`])

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod kv;
pub mod rdb;
pub mod s3;

pub use config::{BackendEntry, GatewayConfig};
pub use error::GatewayError;
pub use gateway::Gateway;
