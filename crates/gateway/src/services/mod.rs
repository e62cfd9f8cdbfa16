//! Gateway services plugged into the hook chains.

pub mod auth;
pub mod authz;
pub mod handshake;
pub mod pending_names;
