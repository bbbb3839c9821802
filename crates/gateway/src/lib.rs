//! HTTP API gateway for Agentry.
//!
//! Thin marshaling layer over the engine and stores: routing, DTOs, and
//! status-code mapping live here; all behavior lives below.

pub mod api_v1;

pub use api_v1::{AppState, SharedState, router};
