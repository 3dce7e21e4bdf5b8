//! Standalone runner: configuration, command line and service wiring.

pub mod app;
pub mod cli;
pub mod config;
