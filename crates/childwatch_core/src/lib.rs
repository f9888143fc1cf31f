//! Core domain logic for childwatch.
//! This crate is the single source of truth for child case invariants.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use context::{CallContext, CancelHandle, CancelReason};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::child::{Child, ChildId, ChildInput, ChildStatus, ChildValidationError, Gender};
pub use repo::child_repo::{
    ChildFilter, ChildRepository, ErrorKind, RepoError, RepoResult, SqliteChildRepository,
};
pub use service::child_service::{CaseUpdateError, ChildService, ChildUpdate};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
