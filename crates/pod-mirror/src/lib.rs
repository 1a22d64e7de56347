//! Pod mirror service
//!
//! Runs the pod sync layer against a local backend fed from a JSON-lines
//! event stream and serves the mirrored state over HTTP.

pub mod api;
pub mod config;
pub mod feed;
