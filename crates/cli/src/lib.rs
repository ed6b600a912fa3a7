//! `jobstream` command line client.
//!
//! Re-exports internal modules for testing. The binary entrypoint lives in
//! `main.rs`.

pub mod args;
pub mod commands;
pub mod exit_error;
pub mod output;
