//! HTTP protocol layer module
//!
//! Response builders and header policy shared by every handler.

pub mod response;

// Re-export commonly used items
pub use response::{build_options_response, finalize, json_response, timestamp, HttpResponse};
