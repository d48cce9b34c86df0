//! Array Registry Module
//!
//! Reconciles the desired array set against the live sessions.

pub mod array_registry;
pub mod events;

pub use array_registry::{ArrayEntry, ArrayRegistry, ReconcileReport};
pub use events::RegistryEvent;
