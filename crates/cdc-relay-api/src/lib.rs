//! HTTP service for the CDC fan-out relay.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod wire;
