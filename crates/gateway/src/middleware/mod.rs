//! HTTP middleware stack for the gateway.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Session layer (tower-sessions)
//! 4. Gate (authorize, authenticate, authorize again)
//!
//! Health endpoints sit outside the gate.

pub mod gate;
pub mod session;

pub use gate::gate;
pub use session::{SESSION_COOKIE_NAME, create_session_layer, session_keys};
