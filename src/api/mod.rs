//! Request pipeline: bearer headers, one refresh-and-retry on 401 and
//! normalized error bodies.

pub mod body;
mod client;

pub use client::{ApiClient, LOGIN_ENDPOINT, REFRESH_ENDPOINT};
