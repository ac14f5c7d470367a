//! # stagefs-common
//!
//! Shared utilities and types for stagefs:
//! - Common error types
//! - Standard filesystem paths

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{StageError, StageResult};
pub use paths::{SESSION_DIR, join_under};
