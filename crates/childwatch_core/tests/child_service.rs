use childwatch_core::db::{into_shared, open_db_in_memory};
use childwatch_core::{
    CallContext, CancelReason, CaseUpdateError, Child, ChildFilter, ChildInput, ChildRepository,
    ChildService, ChildStatus, ChildUpdate, ChildValidationError, Gender, RepoError, RepoResult,
    SqliteChildRepository,
};
use chrono::NaiveDate;
use std::cell::RefCell;

/// Records every call and answers from a `Vec`, so tests can check that the
/// service forwards arguments untouched.
#[derive(Default)]
struct RecordingRepository {
    rows: RefCell<Vec<Child>>,
    calls: RefCell<Vec<String>>,
    fail_with_cancel: bool,
}

impl RecordingRepository {
    fn log(&self, ctx: &CallContext, call: String) -> RepoResult<()> {
        self.calls.borrow_mut().push(call);
        if self.fail_with_cancel {
            return Err(RepoError::Cancelled(CancelReason::DeadlineExceeded));
        }
        ctx.check().map_err(RepoError::Cancelled)
    }
}

impl ChildRepository for RecordingRepository {
    fn add(&self, ctx: &CallContext, child: &Child) -> RepoResult<Child> {
        self.log(ctx, format!("add:{}", child.id()))?;
        self.rows.borrow_mut().push(child.clone());
        Ok(child.clone())
    }

    fn get(&self, ctx: &CallContext, id: &str) -> RepoResult<Option<Child>> {
        self.log(ctx, format!("get:{id}"))?;
        Ok(self.rows.borrow().iter().find(|c| c.id() == id).cloned())
    }

    fn find(&self, ctx: &CallContext, filter: &ChildFilter) -> RepoResult<Vec<Child>> {
        self.log(
            ctx,
            format!("find:{}|{}|{}", filter.name, filter.status, filter.location),
        )?;
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|c| filter.status.is_empty() || c.status().as_str() == filter.status)
            .cloned()
            .collect())
    }

    fn update(&self, ctx: &CallContext, child: &Child) -> RepoResult<()> {
        self.log(ctx, format!("update:{}", child.id()))?;
        let mut rows = self.rows.borrow_mut();
        match rows.iter_mut().find(|c| c.id() == child.id()) {
            Some(row) => {
                *row = child.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound(child.id().to_string())),
        }
    }

    fn remove(&self, ctx: &CallContext, child: &Child) -> RepoResult<()> {
        self.log(ctx, format!("remove:{}", child.id()))?;
        self.rows.borrow_mut().retain(|c| c.id() != child.id());
        Ok(())
    }
}

fn child(id: &str, status: &str) -> Child {
    Child::new(ChildInput {
        id: id.to_string(),
        full_name: "Sofía Romero".to_string(),
        age: 12,
        birth_date: NaiveDate::from_ymd_opt(2013, 9, 9).unwrap(),
        gender: Gender::from(Gender::FEMALE),
        description: "Vista por última vez en la terminal".to_string(),
        location: "Tucumán".to_string(),
        photos: vec!["s1.jpg".to_string()],
        phone: "+54 381 555 0000".to_string(),
        email: "familia.romero@example.org".to_string(),
        status: ChildStatus::from(status),
    })
    .unwrap()
}

#[test]
fn service_forwards_each_operation_once() {
    let service = ChildService::new(RecordingRepository::default());
    let ctx = CallContext::background();
    let record = child("s-1", "activo");

    let created = service.create_child(&ctx, &record).unwrap();
    assert_eq!(created, record);
    assert_eq!(service.get_child(&ctx, "s-1").unwrap(), Some(record.clone()));
    assert_eq!(
        service
            .find_children(&ctx, &ChildFilter::new("sof", "activo", "tuc"))
            .unwrap(),
        vec![record.clone()]
    );
    service.update_child(&ctx, &record).unwrap();
    service.delete_child(&ctx, &record).unwrap();
    assert_eq!(service.get_child(&ctx, "s-1").unwrap(), None);
}

#[test]
fn service_passes_filters_unchanged() {
    let repo = RecordingRepository::default();
    let service = ChildService::new(repo);
    let ctx = CallContext::background();

    service
        .find_children(&ctx, &ChildFilter::new(" Ana ", "URGENTE", ""))
        .unwrap();
    service
        .find_children(&ctx, &ChildFilter::default())
        .unwrap();

    let service_repo_calls = record_calls(&service);
    assert_eq!(
        service_repo_calls,
        vec!["find: Ana |URGENTE|".to_string(), "find:||".to_string()]
    );
}

#[test]
fn service_returns_repository_errors_unchanged() {
    let repo = RecordingRepository {
        fail_with_cancel: true,
        ..RecordingRepository::default()
    };
    let service = ChildService::new(repo);
    let ctx = CallContext::background();

    let err = service.get_child(&ctx, "any").unwrap_err();
    assert!(matches!(
        err,
        RepoError::Cancelled(CancelReason::DeadlineExceeded)
    ));

    let err = service.update_child(&ctx, &child("x", "")).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Cancelled(CancelReason::DeadlineExceeded)
    ));
}

#[test]
fn service_forwards_caller_context() {
    let service = ChildService::new(RecordingRepository::default());
    let ctx = CallContext::background();
    ctx.cancel_handle().cancel();

    let err = service
        .find_children(&ctx, &ChildFilter::default())
        .unwrap_err();
    assert!(matches!(err, RepoError::Cancelled(CancelReason::Cancelled)));
}

#[test]
fn read_modify_write_update_pattern() {
    let service = ChildService::new(RecordingRepository::default());
    let ctx = CallContext::background();
    service.create_child(&ctx, &child("s-2", "activo")).unwrap();

    let mut current = service.get_child(&ctx, "s-2").unwrap().unwrap();
    current.set_status("urgente").unwrap();
    current.set_photos(Vec::new());
    service.update_child(&ctx, &current).unwrap();

    let stored = service.get_child(&ctx, "s-2").unwrap().unwrap();
    assert_eq!(stored.status().as_str(), "urgente");
    assert!(stored.photos().is_empty());
}

#[test]
fn apply_case_update_changes_only_present_fields() {
    let service = ChildService::new(RecordingRepository::default());
    let ctx = CallContext::background();
    service.create_child(&ctx, &child("s-3", "activo")).unwrap();

    let updated = service
        .apply_case_update(
            &ctx,
            "s-3",
            ChildUpdate {
                status: Some(ChildStatus::from(ChildStatus::RESOLVED)),
                photos: None,
            },
        )
        .unwrap();
    assert_eq!(updated.status().as_str(), "resuelto");
    assert_eq!(updated.photos(), ["s1.jpg".to_string()]);

    let updated = service
        .apply_case_update(
            &ctx,
            "s-3",
            ChildUpdate {
                status: None,
                photos: Some(vec!["new.jpg".to_string()]),
            },
        )
        .unwrap();
    assert_eq!(updated.status().as_str(), "resuelto");
    assert_eq!(updated.photos(), ["new.jpg".to_string()]);
}

#[test]
fn apply_case_update_rejects_empty_status_without_writing() {
    let service = ChildService::new(RecordingRepository::default());
    let ctx = CallContext::background();
    service.create_child(&ctx, &child("s-4", "urgente")).unwrap();

    let err = service
        .apply_case_update(
            &ctx,
            "s-4",
            ChildUpdate {
                status: Some(ChildStatus::from("")),
                photos: Some(Vec::new()),
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CaseUpdateError::Validation(ChildValidationError::EmptyStatus)
    ));
    assert!(!record_calls(&service).iter().any(|c| c.starts_with("update:")));
}

#[test]
fn apply_case_update_on_unknown_id_is_not_found() {
    let service = ChildService::new(RecordingRepository::default());
    let err = service
        .apply_case_update(&CallContext::background(), "nope", ChildUpdate::default())
        .unwrap_err();
    assert!(matches!(err, CaseUpdateError::Repo(RepoError::NotFound(ref id)) if id == "nope"));
}

#[test]
fn delete_by_id_distinguishes_missing_cases() {
    let service = ChildService::new(RecordingRepository::default());
    let ctx = CallContext::background();
    service.create_child(&ctx, &child("s-5", "activo")).unwrap();

    let deleted = service.delete_child_by_id(&ctx, "s-5").unwrap();
    assert_eq!(deleted.id(), "s-5");

    let err = service.delete_child_by_id(&ctx, "s-5").unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));

    // The plain contract operation stays idempotent.
    service.delete_child(&ctx, &deleted).unwrap();
}

#[test]
fn service_works_over_sqlite_repository() {
    let conn = into_shared(open_db_in_memory().unwrap());
    let service = ChildService::new(SqliteChildRepository::try_new(conn).unwrap());
    let ctx = CallContext::background();

    let record = child("", "");
    let created = service.create_child(&ctx, &record).unwrap();
    let fetched = service.get_child(&ctx, created.id()).unwrap().unwrap();
    assert_eq!(fetched, record);

    let updated = service
        .apply_case_update(
            &ctx,
            created.id(),
            ChildUpdate {
                status: Some(ChildStatus::from(ChildStatus::URGENT)),
                photos: Some(Vec::new()),
            },
        )
        .unwrap();
    let urgent = service
        .find_children(&ctx, &ChildFilter::new("", "urgente", ""))
        .unwrap();
    assert_eq!(urgent, vec![updated]);

    service.delete_child_by_id(&ctx, created.id()).unwrap();
    assert!(service
        .find_children(&ctx, &ChildFilter::default())
        .unwrap()
        .is_empty());
}

fn record_calls(service: &ChildService<RecordingRepository>) -> Vec<String> {
    service.repository().calls.borrow().clone()
}
