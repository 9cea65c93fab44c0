//! Command-line interface and orchestration for mailpulse
//!
//! This module implements the CLI commands and wires the statistics service to
//! configuration, caching, progress reporting, and report generation.
//!
//! # Implementation Model
//!
//! ## Commands
//!
//! - **snapshot**: Build a snapshot for a token (or reuse a cached one) and report it
//!   to the console, a JSON file, or a CSV file
//! - **init**: Generate a default configuration file
//! - **validate**: Check configuration file syntax and values
//!
//! ## Execution Flow
//!
//! The `run` function parses command-line arguments using clap and routes
//! to the appropriate command handler. The snapshot command:
//!
//! 1. Initializes logging and loads configuration
//! 2. Creates the provider client and an on-disk snapshot store
//! 3. Runs the build under a progress indicator, racing it against Ctrl-C
//! 4. Generates the requested reports
//!
//! The `common` module provides shared option types and logging setup.
//!
//! Configuration is managed through a TOML file (`mailpulse.toml`) that sets
//! cache lifetime, paging limits, concurrency, timeouts, and endpoint URLs.

mod common;
mod config;
mod host;
mod init;
mod progress_reporter;
mod run;
mod snapshot;
mod validate;

#[cfg(debug_assertions)]
pub use config::Config;

pub use common::{ColorMode, LogLevel};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::run;
pub use snapshot::{SnapshotArgs, take_snapshot};
pub use validate::{ValidateArgs, validate_config};
