//! Ambient application concerns (G1/G2) plus the top-level service
//! (`service::Application`) that wires the repository cache, thread
//! pool, and configured options into request handling.

pub mod config;
pub mod logging;
pub mod service;
