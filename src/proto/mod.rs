//! # Proto
//!
//! RESP wire protocol: frame types, the codec and the crate-wide error type.
//!
//! ## Modules
//!
//! - [`codec`] - Encoder, pull decoder and streaming reader
//! - [`error`] - Error types and their classification
//! - [`frame`] - Frame types representing RESP data structures

pub mod codec;
/// Error types.
pub mod error;
pub mod frame;
