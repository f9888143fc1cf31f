//! Subcommand execution and outcome mapping.
//!
//! # Responsibility
//! - Translate parsed arguments into `ChildService` calls.
//! - Render records as JSON and map failures to exit codes.
//!
//! # Invariants
//! - Every command builds exactly one `CallContext` with the configured
//!   deadline and passes it to every service call it makes.
//! - `get` absence and storage failure stay distinct outcomes.

use crate::config::{Command, NewCaseArgs};
use anyhow::Context;
use childwatch_core::{
    CallContext, CaseUpdateError, Child, ChildFilter, ChildInput, ChildRepository, ChildService,
    ChildStatus, ChildUpdate, ChildValidationError, ErrorKind, Gender, RepoError,
};
use std::process::ExitCode;

/// Result class of one command, mapped 1:1 to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    StorageFailure,
    InvalidInput,
    NotFound,
    Cancelled,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(match self {
            Self::Ok => 0,
            Self::StorageFailure => 1,
            Self::InvalidInput => 2,
            Self::NotFound => 3,
            Self::Cancelled => 4,
        })
    }

    fn from_repo_error(err: &RepoError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Cancelled => Self::Cancelled,
            ErrorKind::Storage => Self::StorageFailure,
        }
    }
}

/// Output of a command: what to print and how to exit.
#[derive(Debug)]
pub struct Report {
    pub outcome: Outcome,
    pub body: String,
}

impl Report {
    fn ok(body: String) -> Self {
        Self {
            outcome: Outcome::Ok,
            body,
        }
    }

    fn failure(outcome: Outcome, message: impl std::fmt::Display) -> Self {
        Self {
            outcome,
            body: serde_json::json!({ "error": message.to_string() }).to_string(),
        }
    }

    fn from_repo_error(err: &RepoError) -> Self {
        Self::failure(Outcome::from_repo_error(err), err)
    }

    fn from_validation_error(err: &ChildValidationError) -> Self {
        Self::failure(Outcome::InvalidInput, err)
    }
}

/// Runs one subcommand against `service`.
pub fn execute<R: ChildRepository>(
    service: &ChildService<R>,
    ctx: &CallContext,
    command: Command,
) -> anyhow::Result<Report> {
    match command {
        Command::Add(args) => {
            let child = match Child::new(new_case_input(args)) {
                Ok(child) => child,
                Err(err) => return Ok(Report::from_validation_error(&err)),
            };
            match service.create_child(ctx, &child) {
                Ok(created) => render(&created),
                Err(err) => Ok(Report::from_repo_error(&err)),
            }
        }
        Command::Get { id } => match service.get_child(ctx, &id) {
            Ok(Some(child)) => render(&child),
            Ok(None) => Ok(Report::failure(Outcome::NotFound, "not found")),
            Err(err) => Ok(Report::from_repo_error(&err)),
        },
        Command::Find {
            name,
            status,
            location,
        } => match service.find_children(ctx, &ChildFilter::new(name, status, location)) {
            Ok(children) => render(&children),
            Err(err) => Ok(Report::from_repo_error(&err)),
        },
        Command::Update {
            id,
            status,
            photos,
            clear_photos,
        } => {
            let photos = if clear_photos {
                Some(Vec::new())
            } else if photos.is_empty() {
                None
            } else {
                Some(photos)
            };
            let update = ChildUpdate {
                status: status.map(ChildStatus::from),
                photos,
            };
            match service.apply_case_update(ctx, &id, update) {
                Ok(child) => render(&child),
                Err(CaseUpdateError::Validation(err)) => Ok(Report::from_validation_error(&err)),
                Err(CaseUpdateError::Repo(err)) => Ok(Report::from_repo_error(&err)),
            }
        }
        Command::Delete { id } => match service.delete_child_by_id(ctx, &id) {
            Ok(_) => Ok(Report::ok(String::new())),
            Err(err) => Ok(Report::from_repo_error(&err)),
        },
    }
}

fn new_case_input(args: NewCaseArgs) -> ChildInput {
    ChildInput {
        id: args.id,
        full_name: args.full_name,
        age: args.age,
        birth_date: args.birth_date,
        gender: Gender::from(args.gender),
        description: args.description,
        location: args.location,
        photos: args.photos,
        phone: args.phone,
        email: args.email,
        status: ChildStatus::from(args.status),
    }
}

fn render<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<Report> {
    let body = serde_json::to_string_pretty(value).context("failed to encode response")?;
    Ok(Report::ok(body))
}
