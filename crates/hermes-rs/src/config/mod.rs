//! Configuration management for the hermes-rs gateway.

pub mod settings;
