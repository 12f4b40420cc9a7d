//! # nilVM Core
//!
//! Shared vocabulary of the nilVM client: identifiers, values, permissions,
//! payment types, the unified error type, configuration and the effect
//! interfaces (node RPCs, masking, payment chain, retry policy) the client
//! is written against.
//!
//! This crate performs no I/O of its own beyond reading configuration files.

pub mod config;
pub mod effects;
pub mod errors;
pub mod messages;
pub mod types;

pub use config::{ClientConfig, RetrySettings};
pub use errors::{NetworkFailure, NilError, Result, RpcCode, TransportError};
pub use types::*;
