//! Flood Watch - live water-level status and telemetry aggregation
//!
//! This library exposes the core modules for testing and reuse.

pub mod common;
pub mod config;
pub mod entity;
pub mod error;
pub mod reconcile;
pub mod routes;
pub mod services;
pub mod store;
pub mod sync;
pub mod telemetry;
