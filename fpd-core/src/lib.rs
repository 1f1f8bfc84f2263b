//! Core library of the finality provider daemon: domain model, EOTS
//! cryptography, persistence, chain-client and signer interfaces, and the
//! per-provider control loop.

pub mod application;
pub mod config;
pub mod domain;
pub mod eots;
pub mod foundation;
pub mod infrastructure;
