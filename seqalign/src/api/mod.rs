//! HTTP API.
//!
//! Job submission and polling, health checks, log filter control and the
//! static web client.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
