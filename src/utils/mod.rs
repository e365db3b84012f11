//! Utility Functions
//!
//! User-friendly error formatting for the binary.

pub mod errors;

pub use errors::format_user_error;
