//! finsheet reads personal-finance transactions from a Google sheet, cleans and summarizes them,
//! and writes the report back to the same sheet.
//!
//! The stages run strictly in order: the credential store, the sheet read,
//! [`transform::clean`], [`analysis::Report::build`] and the report publish. The `run` command ties
//! them together.

pub mod analysis;
mod api;
pub mod args;
mod backup;
pub mod commands;
mod config;
mod error;
pub mod model;
mod pipeline;
mod report;
pub mod transform;
mod utils;

pub use api::Mode;
pub use config::{Config, Ranges};
pub use error::{Error, ErrorType, Result};
pub use pipeline::{RunOptions, RunSummary};
pub use report::Published;
