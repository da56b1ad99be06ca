//! services/api/src/lib.rs
//!
//! Library surface of the API service so the binary and the integration
//! tests share the same modules.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
