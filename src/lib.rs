//! Sensor Registry
//!
//! HTTP API over three stores: PostgreSQL for sensor identities, MongoDB for
//! geospatial sensor documents and Redis for the latest telemetry. The
//! aggregation service answers "sensors near a point" by combining the geo
//! and telemetry stores.

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod model;
pub mod security;
pub mod service;
pub mod store;
