//! Utility modules for the hermes-rs gateway.

pub mod user_info;
