//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod destroy;
pub mod distributions;
pub mod full;
pub mod install;
pub mod run;
pub mod shared;
pub mod shell;
