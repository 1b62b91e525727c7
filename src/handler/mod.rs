//! Request handler module
//!
//! Responsible for request routing dispatch and the JSON endpoints.

mod diagnostics;
mod email;
pub mod router;
mod stats;
mod types;

// Re-export main entry point
pub use router::handle_request;
