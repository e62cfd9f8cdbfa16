//! Core types for padgate.
//!
//! This module provides type-safe wrappers for the identifiers and records
//! that flow between the HTTP, authorization and session layers.

pub mod identity;
pub mod key;
pub mod message;
pub mod username;

pub use identity::{SessionIdentity, VerifiedIdentity};
pub use key::*;
pub use message::{MessageTypeError, SessionMessage, message_types};
pub use username::{Username, UsernameError};
