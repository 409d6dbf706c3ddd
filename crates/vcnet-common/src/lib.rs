//! # vcnet-common
//!
//! Shared utilities and types for the vcnet endpoint subsystem.
//!
//! This crate provides common functionality used across all vcnet crates:
//! - The common error type
//! - Hardware (MAC) address generation and validation
//! - Standard filesystem locations (state root, sysfs, device nodes)

#![warn(missing_docs)]

pub mod error;
pub mod mac;
pub mod paths;

pub use error::{VcError, VcResult};
pub use mac::HardwareAddr;
pub use paths::VcnetPaths;
