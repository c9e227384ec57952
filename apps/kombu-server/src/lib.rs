//! HTTP server for the Kombu vector search service.
//!
//! Exposes the library/document/chunk hierarchy, index rebuild, and
//! search over REST, plus health and Prometheus metrics endpoints. The
//! store itself is synchronous (OS threads + per-library RW locks), so
//! handlers bridge into it with `spawn_blocking`.

pub mod config;
pub mod http;
pub mod metrics;
