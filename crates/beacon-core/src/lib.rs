//! # Beacon Core
//!
//! Core types, traits, and error definitions for the Beacon job pipeline.
//! This crate provides the foundational abstractions shared by the
//! configuration, repository, and pipeline layers.

pub mod domain;
pub mod error;
pub mod id;
pub mod pagination;
pub mod result;
pub mod telemetry;
pub mod traits;
pub mod validation;

pub use domain::*;
pub use error::*;
pub use id::*;
pub use pagination::*;
pub use result::*;
pub use telemetry::*;
pub use traits::*;
pub use validation::*;

// Re-export shaku for dependency injection
pub use shaku::Interface;
