#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for mailpulse
//!
//! This library consolidates all functionality for the mailpulse tool, which builds
//! per-user mailbox activity snapshots from a mail provider's HTTP APIs.
//!
//! # Module Organization
//!
//! - [`commands`]: Command-line interface and orchestration
//! - [`stats`]: Counting, monthly aggregation, and snapshot caching
//! - [`reports`]: Snapshot rendering in multiple formats

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

#[cfg(any(debug_assertions, test))]
pub mod reports;
#[cfg(not(any(debug_assertions, test)))]
mod reports;

pub mod stats;

pub use crate::commands::{Host, run};
