//! Shared helpers for command implementations.

pub mod preflight;
pub mod report;

pub use preflight::{prepare, selection_from, GlobalOptions, Prepared};
pub use report::publish_report;
