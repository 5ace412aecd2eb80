//! GeoLabel Core - Domain models, collaborator ports, and configuration
//!
//! This crate contains the shared domain types and port definitions for the
//! GeoLabel inference and job orchestration system.

pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use error::{GeolabelError, Result};
