//! RESP frame types.
//!
//! This module defines the reply values of both protocol revisions:
//! the five RESP2 types plus null, and the RESP3 additions.

/// Frame type definitions.
pub mod types;

pub use types::{Frame, ServerError};
