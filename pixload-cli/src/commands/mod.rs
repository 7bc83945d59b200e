//! CLI command implementations.
//!
//! - [`fetch`] - Load one image through the manager and save it as PNG
//! - [`config`] - Print the effective configuration

pub mod config;
pub mod fetch;
