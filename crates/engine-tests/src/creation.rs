use crate::support::*;
use engine_core::cache::{EmploymentRow, PersonRow};
use engine_core::services::SnapshotRefresh;
use engine_core::summary::UserRunStatus;
use engine_runtime::error::ExecutorError;
use engine_runtime::executor::Executor;
use model::entity::Entity;
use model::payload::EntityPayload;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn managers_are_created_before_their_reports() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let manager = new_hire("a100");
    let mut report_rec = new_hire("b200");
    report_rec.manager = Some("a100".into());

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    let report = executor
        .run_creation(vec![report_rec, manager])
        .await
        .unwrap();

    assert_eq!(report.success_count, 2);
    assert_eq!(report.failed_count, 0);
    assert_eq!(upsert.users_submitted_for(Entity::Position), vec!["a100", "b200"]);
    assert_eq!(upsert.users_submitted_for(Entity::EmpJob), vec!["a100", "b200"]);

    // The report's new position points at the manager's position created in
    // the earlier batch.
    let positions = upsert.payloads_for(Entity::Position, "b200");
    match &positions[0] {
        EntityPayload::Position(p) => {
            assert_eq!(p.parent_position.as_deref(), Some("1020001"));
            assert_eq!(p.supervisor, None);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn mutual_manager_cycle_is_broken_and_both_are_created() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let mut a = new_hire("a100");
    a.manager = Some("b200".into());
    let mut b = new_hire("b200");
    b.manager = Some("a100".into());

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    let report = executor.run_creation(vec![a, b]).await.unwrap();

    assert_eq!(report.failed_count, 0);
    let mut submitted = upsert.users_submitted_for(Entity::Position);
    submitted.sort();
    assert_eq!(submitted, vec!["a100", "b200"]);
}

#[tokio::test]
async fn position_failure_skips_dependents_but_not_siblings() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    upsert.fail(Entity::Position, "bad");
    let mut bad = new_hire("bad");
    bad.email = Some("bad@elsewhere.org".into());
    let good = new_hire("good");

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    let report = executor.run_creation(vec![bad, good]).await.unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failed_count, 1);

    let failed = report.users.iter().find(|u| u.userid == "bad").unwrap();
    assert_eq!(failed.status, UserRunStatus::Failed);
    assert!(failed.failed_entities.contains(&Entity::Position));
    assert!(failed.skipped_entities.contains(&Entity::PerPerson));
    let message = failed.error_message.as_deref().unwrap();
    assert!(message.contains("Position failed - Message: Scripted failure, HTTP Code: 500"));

    assert_eq!(upsert.users_submitted_for(Entity::EmpJob), vec!["good"]);
}

#[tokio::test]
async fn matching_existing_person_is_not_resubmitted() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let record = new_hire("u100");
    let mut caches = base_caches();
    caches.persons.push(PersonRow {
        person_id_external: "u100".into(),
        firstname: record.firstname.clone(),
        lastname: record.lastname.clone(),
        gender: record.gender.clone(),
        date_of_birth: record.date_of_birth,
        date_of_position: record.date_of_position,
        email: record.email.clone(),
        private_email: None,
        phone: None,
    });

    let executor = Executor::new(standard_processor(caches, upsert.clone()));
    let report = executor.run_creation(vec![record]).await.unwrap();

    let user = &report.users[0];
    assert_eq!(user.status, UserRunStatus::Warning);
    assert!(
        user.warning_message
            .as_deref()
            .unwrap()
            .contains("personIdExternal 'u100' already exists")
    );
    assert!(upsert.users_submitted_for(Entity::PerPersonal).is_empty());
    assert!(upsert.users_submitted_for(Entity::PerEmail).is_empty());
    assert_eq!(upsert.users_submitted_for(Entity::EmpJob), vec!["u100"]);
}

#[tokio::test]
async fn deferred_employment_uses_the_created_position_and_syncs_its_date() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    let report = executor.run_creation(vec![new_hire("u100")]).await.unwrap();
    assert_eq!(report.success_count, 1);

    match &upsert.payloads_for(Entity::EmpJob, "u100")[0] {
        EntityPayload::EmpJob(job) => {
            assert_eq!(job.position, "1020001");
            assert_eq!(job.seq_number, 1);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // The position effective date is pulled to the submitted job start.
    let syncs = upsert.single_position_calls();
    assert_eq!(syncs.len(), 1);
    match &syncs[0] {
        EntityPayload::Position(p) => {
            assert_eq!(p.code.as_deref(), Some("1020001"));
            assert_eq!(p.effective_start_date, date(2020, 1, 1));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn sentinel_manager_reads_as_no_manager() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let mut record = new_hire("u100");
    record.manager = Some("NO_MANAGER".into());

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    executor.run_creation(vec![record]).await.unwrap();

    match &upsert.payloads_for(Entity::Position, "u100")[0] {
        EntityPayload::Position(p) => {
            assert_eq!(p.parent_position, None);
            assert_eq!(p.supervisor, None);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    match &upsert.payloads_for(Entity::EmpJob, "u100")[0] {
        EntityPayload::EmpJob(job) => assert_eq!(job.manager_id, "NO_MANAGER"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn relationship_failures_only_warn() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    upsert.fail(Entity::EmpJobRelationships, "u100");
    let mut record = new_hire("u100");
    record.hr = Some("h500".into());
    let mut caches = base_caches();
    caches.employees.push(EmploymentRow {
        userid: "h500".into(),
        position: Some("P888".into()),
        seq_number: Some(2),
        start_date: Some(date(2023, 1, 1)),
    });

    let executor = Executor::new(standard_processor(caches, upsert.clone()));
    let report = executor.run_creation(vec![record]).await.unwrap();

    let user = &report.users[0];
    assert_eq!(user.status, UserRunStatus::Warning);
    assert!(user.failed_entities.contains(&Entity::EmpJobRelationships));
    assert!(
        user.warning_message
            .as_deref()
            .unwrap()
            .contains("EmpJobRelationships failed")
    );
}

#[tokio::test]
async fn new_employee_gets_a_pseudonymous_primary_email() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    executor.run_creation(vec![new_hire("u100")]).await.unwrap();

    let emails = upsert.payloads_for(Entity::PerEmail, "u100");
    assert_eq!(emails.len(), 1);
    match &emails[0] {
        EntityPayload::PerEmail(write) => {
            assert!(write.payload.email_address.starts_with("user"));
            assert!(write.payload.email_address.ends_with("@corp.example"));
            assert!(write.payload.is_primary);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn snapshots_refresh_between_batches_and_sinks_receive_the_report() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let snapshots = StaticSnapshots::new(SnapshotRefresh::default());
    let history = RecordingSink::new();
    let notifications = RecordingSink::new();

    let manager = new_hire("a100");
    let mut report_rec = new_hire("b200");
    report_rec.manager = Some("a100".into());

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()))
        .with_snapshot_provider(snapshots.clone())
        .with_history_sink(history.clone())
        .with_notification_sink(notifications.clone());
    executor
        .run_creation(vec![manager, report_rec])
        .await
        .unwrap();

    // Two dependency batches, one refresh in between.
    assert_eq!(snapshots.call_count(), 1);
    assert_eq!(history.report_count(), 1);
    assert_eq!(notifications.report_count(), 1);
}

#[tokio::test]
async fn cancelled_token_aborts_before_processing() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let token = CancellationToken::new();
    token.cancel();

    let executor =
        Executor::new(standard_processor(base_caches(), upsert.clone())).with_shutdown(token);
    let result = executor.run_creation(vec![new_hire("u100")]).await;

    assert!(matches!(result, Err(ExecutorError::ShutdownRequested)));
    assert!(upsert.submitted_entities().is_empty());
}
