//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contract the service layer depends on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository reads never return records that fail `Child::new`.
//! - Point lookups report absence as `Ok(None)`, not as an error.

pub mod child_repo;
