//! Core library for the Ansible role tester
//!
//! This crate contains the distribution catalog, process execution, container
//! lifecycle, path mapping, Ansible stage execution, idempotence evaluation, the
//! test pipeline, reporting, logging and error handling.

pub mod ansible;
pub mod config;
pub mod container;
pub mod distribution;
pub mod errors;
pub mod git;
pub mod idempotence;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod report;
