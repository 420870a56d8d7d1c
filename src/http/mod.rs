//! HTTP transport for remote document sources
//!
//! - [`HttpClient`] - POSTs JSON under one endpoint root; transient failures
//!   (429, 5xx, timeouts, connection errors) go through [`crate::retry::retry`]
//!   and a `Retry-After` header lengthens the next delay
//! - [`RateLimiter`] - governor token bucket shared by every request of a client

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
