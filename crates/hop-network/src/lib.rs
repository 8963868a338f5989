//! Hop Network Layer
//!
//! Minimal async HTTPS client used to fetch the live server catalog.

mod client;

pub use client::{ClientStats, HttpClient, HttpClientConfig, HttpError, Response};
