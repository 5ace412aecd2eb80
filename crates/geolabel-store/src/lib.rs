//! GeoLabel Store - Job persistence ports and adapters
//!
//! This crate defines the job store port and provides an in-memory adapter
//! for tests and a durable JSON-file adapter.

pub mod file;
pub mod memory;
pub mod ports;
mod table;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use ports::JobStore;
