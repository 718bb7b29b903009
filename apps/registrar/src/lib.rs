//! # Registrar Library
//!
//! The HTTP API, CLI commands and server configuration of the Registrar
//! binary, exposed for integration tests.
//!
//! Every rule lives in `registrar_core`; this crate only translates HTTP
//! requests and command-line arguments into core calls.

pub mod api;
pub mod cli;
pub mod config;

pub use registrar_core;
