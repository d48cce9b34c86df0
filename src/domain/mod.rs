//! Domain Module
//!
//! Core domain types and port traits shared by every component.

pub mod ports;

pub use ports::*;
