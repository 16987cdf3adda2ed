//! Core library for the `stampede` CLI.
//!
//! This crate provides the internal building blocks used by the binary: CLI
//! argument types, workload configuration parsing, the virtual-user engine,
//! request execution, check evaluation, and metrics aggregation. The primary
//! user-facing interface is the `stampede` command-line application; library
//! APIs may evolve as the CLI grows.
pub mod args;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod http;
pub mod logger;
pub mod metrics;
pub mod report;
pub mod shutdown;
pub mod workload;
