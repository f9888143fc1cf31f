//! Child case use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for transport callers.
//! - Delegate persistence to the `ChildRepository` contract.
//!
//! # Invariants
//! - Service APIs never bypass the repository contract.
//! - Context, arguments, results and errors pass through unchanged.
//! - The service holds no state besides its repository.

use crate::context::CallContext;
use crate::model::child::{Child, ChildStatus, ChildValidationError};
use crate::repo::child_repo::{ChildFilter, ChildRepository, RepoError, RepoResult};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Use-case service wrapper for child case operations.
pub struct ChildService<R: ChildRepository> {
    repo: R,
}

/// Partial update applied by [`ChildService::apply_case_update`].
///
/// `None` leaves the field as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildUpdate {
    pub status: Option<ChildStatus>,
    pub photos: Option<Vec<String>>,
}

/// Failure of a composed read-modify-write flow.
#[derive(Debug)]
pub enum CaseUpdateError {
    Validation(ChildValidationError),
    Repo(RepoError),
}

impl Display for CaseUpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CaseUpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for CaseUpdateError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ChildValidationError> for CaseUpdateError {
    fn from(value: ChildValidationError) -> Self {
        Self::Validation(value)
    }
}

impl<R: ChildRepository> ChildService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrows the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Persists a newly reported case.
    pub fn create_child(&self, ctx: &CallContext, child: &Child) -> RepoResult<Child> {
        self.repo.add(ctx, child)
    }

    /// Gets one case by id; `Ok(None)` when it does not exist.
    pub fn get_child(&self, ctx: &CallContext, id: &str) -> RepoResult<Option<Child>> {
        self.repo.get(ctx, id)
    }

    /// Lists cases matching the non-blank filters.
    pub fn find_children(
        &self,
        ctx: &CallContext,
        filter: &ChildFilter,
    ) -> RepoResult<Vec<Child>> {
        self.repo.find(ctx, filter)
    }

    /// Overwrites a stored case.
    ///
    /// Intended after `get_child` + `set_status`/`set_photos`. No version
    /// check is made, so concurrent updates of one id end with the last
    /// write.
    pub fn update_child(&self, ctx: &CallContext, child: &Child) -> RepoResult<()> {
        self.repo.update(ctx, child)
    }

    /// Deletes a case. Deleting an already absent case succeeds.
    pub fn delete_child(&self, ctx: &CallContext, child: &Child) -> RepoResult<()> {
        self.repo.remove(ctx, child)
    }

    /// Fetches the case, applies the present fields of `update`, persists it.
    ///
    /// # Errors
    /// - `Repo(NotFound)` when no case has `id`.
    /// - `Validation(EmptyStatus)` when `update.status` is empty; nothing is
    ///   written in that case.
    pub fn apply_case_update(
        &self,
        ctx: &CallContext,
        id: &str,
        update: ChildUpdate,
    ) -> Result<Child, CaseUpdateError> {
        let mut child = self
            .repo
            .get(ctx, id)?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        if let Some(status) = update.status {
            child.set_status(status)?;
        }
        if let Some(photos) = update.photos {
            child.set_photos(photos);
        }

        self.repo.update(ctx, &child)?;
        Ok(child)
    }

    /// Deletes the case stored under `id`, returning what was deleted.
    ///
    /// Unlike [`Self::delete_child`], an unknown id is `NotFound`.
    pub fn delete_child_by_id(&self, ctx: &CallContext, id: &str) -> RepoResult<Child> {
        let child = self
            .repo
            .get(ctx, id)?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        self.repo.remove(ctx, &child)?;
        Ok(child)
    }
}
