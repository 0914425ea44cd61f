//! services/client/src/lib.rs
//!
//! The terminal client: configuration, adapters for the core ports, the
//! shared application state and the command line.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod error;
pub mod state;
