//! REST surface for oddsim
//!
//! Every handler answers `{"result": ...}` on success and `{"error": "..."}`
//! otherwise. Input errors map to 400, deadline expiry to 504, everything
//! else to 500.

pub mod rest;

pub use rest::{RestApi, MIN_MATCHES_RANGE};
