//! padgate core - shared types library.
//!
//! This crate provides the types shared by the gateway and its tests:
//! - opaque identifiers that correlate HTTP sessions, live connections and
//!   author records
//! - the identities produced by the directory and held in the HTTP session
//! - the session-layer message envelope inspected by the handshake hooks
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype keys, usernames, identities and session messages

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
