//! Domain model for child case records.
//!
//! # Responsibility
//! - Define the validated record every other layer passes around.
//!
//! # Invariants
//! - Records can only be built through `Child::new` (or deserialization,
//!   which routes through it).
//! - Deletion is physical; the model carries no tombstone state.

pub mod child;
