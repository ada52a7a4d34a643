//! Logging configuration for the hermes-rs gateway.

pub mod logger;
