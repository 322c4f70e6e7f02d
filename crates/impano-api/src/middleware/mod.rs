//! HTTP middleware layers.

pub mod metrics;
