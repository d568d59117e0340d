//! Common utilities for the USB/IP client
//!
//! This crate provides functionality shared by the client library, its
//! binary, and the integration tests: error handling, logging setup, and
//! test fixtures (mock device descriptors and a mock remote exporter).

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
