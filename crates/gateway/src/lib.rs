//! Padgate library.
//!
//! An authentication gateway in front of a collaborative editor: HTTP
//! requests are checked against an LDAP directory, administrative paths are
//! gated on group membership, and the directory's display name is written
//! into the editor's author record when a live session starts.
//!
//! The three events involved (HTTP authentication, resource authorization,
//! session handshake) share no call stack; they are correlated through the
//! HTTP session id, the live connection id and the author token.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod hooks;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use routes::app;
pub use state::AppState;
