//! Request-processing middleware for the hermes-rs gateway.
//!
//! Only the circuit breaker gate lives in the library; rate limiting, CORS,
//! compression, and access logging are composed in the server binary from
//! off-the-shelf middlewares.

pub mod circuit_breaker;
