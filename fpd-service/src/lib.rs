//! Daemon surface of the finality provider: JSON-RPC API and service wiring.

pub mod api;
pub mod service;
