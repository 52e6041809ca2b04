//! Shared service plumbing: tracing setup, request-id middleware, and
//! health-check handlers. Domain logic lives in the service crates.

pub mod health;
pub mod middleware;
pub mod tracing;
