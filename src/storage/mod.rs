//! Persistence module
//!
//! Holds the file-backed vote counters.

mod counter;

pub use counter::CounterStore;
