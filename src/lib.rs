//! Todo Tracker Library
//!
//! This module exports the core components for testing and integration.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod logging;
pub mod types;
