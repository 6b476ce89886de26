//! `ylfit` library crate.
//!
//! The binary (`ylfit`) is a thin wrapper around this library so that:
//!
//! - the fitting engine is testable without spawning processes
//! - a host (GUI, batch service, notebook bindings) can drive `fit::FitSession`
//!   directly, one `advance()` at a time
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod derived;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
