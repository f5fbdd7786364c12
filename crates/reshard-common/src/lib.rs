//! Reshard Common - Shared types and utilities
//!
//! This crate provides the row model, distribution policies, error
//! definitions and configuration used by every Reshard component.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ClusterConfig, Config, ReshuffleConfig};
pub use error::{Error, Result};
pub use types::*;
