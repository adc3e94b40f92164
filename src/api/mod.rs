//! API implementations.

pub mod client;
