//! Rill - lazy byte buckets and an HTTP/1.1 client built on them.
//!
//! A bucket is a pull-based byte source that never materializes a full
//! message in memory: it hands out whatever is available, supports
//! peek-without-consume, and composes through decorators (bounded take,
//! chunked transfer coding, lazy concatenation). The client layer drives
//! HTTP/1.1 over pooled per-origin channels with transparent redirect
//! chaining.

pub mod bucket;
pub mod client;
pub mod config;
