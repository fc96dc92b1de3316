use crate::support::*;
use engine_core::cache::{EmploymentRow, PositionRow};
use engine_core::summary::UserRunStatus;
use engine_runtime::executor::Executor;
use model::contact::EmailAction;
use model::entity::Entity;
use model::payload::EntityPayload;
use model::record::FieldChange;

fn change(userid: &str, field: &str) -> FieldChange {
    FieldChange {
        userid: userid.into(),
        field_name: field.into(),
        ..Default::default()
    }
}

fn caches_with_employment() -> engine_core::cache::ReferenceCaches {
    let mut caches = base_caches();
    caches.source_records.push(new_hire("u100"));
    caches.employees.push(EmploymentRow {
        userid: "u100".into(),
        position: Some("P1".into()),
        seq_number: Some(3),
        start_date: Some(date(2019, 1, 1)),
    });
    caches.positions.push(PositionRow {
        code: "P1".into(),
        company: Some("1710".into()),
        jobcode: Some("J42".into()),
        location: Some("LOC1".into()),
        cost_center: Some("CC1".into()),
        effective_start_date: Some(date(2015, 6, 1)),
        standard_hours: Some("38".into()),
        criticality: None,
    });
    caches
}

#[tokio::test]
async fn jobcode_change_rewrites_only_the_position() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(standard_processor(caches_with_employment(), upsert.clone()));
    let report = executor
        .run_updates(vec![change("u100", "jobcode")])
        .await
        .unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(upsert.submitted_entities(), vec![Entity::Position]);
    match &upsert.payloads_for(Entity::Position, "u100")[0] {
        EntityPayload::Position(p) => {
            assert_eq!(p.code.as_deref(), Some("P1"));
            // Effective history must not move on an organizational update.
            assert_eq!(p.effective_start_date, date(2015, 6, 1));
            assert_eq!(p.standard_hours, "38");
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert!(upsert.single_position_calls().is_empty());
}

#[tokio::test]
async fn manager_change_moves_the_job_and_syncs_instead_of_writing_the_position() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let mut caches = caches_with_employment();
    caches.source_records[0].manager = Some("m900".into());

    let executor = Executor::new(standard_processor(caches, upsert.clone()));
    let report = executor
        .run_updates(vec![change("u100", "manager")])
        .await
        .unwrap();

    assert_eq!(report.success_count, 1);
    // The position write is suppressed: the date sync after the job round
    // would otherwise move the position twice.
    assert!(upsert.users_submitted_for(Entity::Position).is_empty());
    match &upsert.payloads_for(Entity::EmpJob, "u100")[0] {
        EntityPayload::EmpJob(job) => {
            assert_eq!(job.seq_number, 4);
            assert_eq!(job.position, "P1");
            assert_eq!(job.manager_id, "m900");
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let syncs = upsert.single_position_calls();
    assert_eq!(syncs.len(), 1);
    match &syncs[0] {
        EntityPayload::Position(p) => {
            assert_eq!(p.code.as_deref(), Some("P1"));
            assert_eq!(p.effective_start_date, date(2021, 6, 1));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn structured_email_actions_submit_in_action_order() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let changes = vec![
        FieldChange {
            userid: "u100".into(),
            field_name: "email::insert::18240".into(),
            source_value: Some("new@home.net".into()),
            ..Default::default()
        },
        FieldChange {
            userid: "u100".into(),
            field_name: "email::delete::18240".into(),
            source_value: Some("old@home.net".into()),
            ..Default::default()
        },
        FieldChange {
            userid: "u100".into(),
            field_name: "email::promote::18242".into(),
            source_value: Some("jane@work.com".into()),
            ..Default::default()
        },
    ];

    let executor = Executor::new(standard_processor(caches_with_employment(), upsert.clone()));
    let report = executor.run_updates(changes).await.unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(
        upsert.email_rounds(),
        vec![EmailAction::Delete, EmailAction::Promote, EmailAction::Insert]
    );
    let payloads = upsert.payloads_for(Entity::PerEmail, "u100");
    let promote = payloads
        .iter()
        .find_map(|p| match p {
            EntityPayload::PerEmail(w) if w.action == EmailAction::Promote => Some(w),
            _ => None,
        })
        .unwrap();
    assert!(promote.payload.is_primary);
    assert_eq!(promote.payload.email_address, "jane@work.com");
}

#[tokio::test]
async fn email_failure_fails_the_user() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    upsert.fail(Entity::PerEmail, "u100");

    let executor = Executor::new(standard_processor(caches_with_employment(), upsert.clone()));
    let report = executor
        .run_updates(vec![FieldChange {
            userid: "u100".into(),
            field_name: "email::promote::18242".into(),
            source_value: Some("jane@work.com".into()),
            ..Default::default()
        }])
        .await
        .unwrap();

    assert_eq!(report.failed_count, 1);
    let user = &report.users[0];
    assert!(
        user.error_message
            .as_deref()
            .unwrap()
            .contains("PerEmail failed")
    );
}

#[tokio::test]
async fn unknown_changed_field_warns_and_submits_nothing() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(standard_processor(caches_with_employment(), upsert.clone()));
    let report = executor
        .run_updates(vec![change("u100", "shoe_size")])
        .await
        .unwrap();

    assert_eq!(report.warning_count, 1);
    let user = &report.users[0];
    assert_eq!(user.status, UserRunStatus::Warning);
    assert!(
        user.warning_message
            .as_deref()
            .unwrap()
            .contains("No entity mapping for changed field 'shoe_size'")
    );
    assert!(upsert.submitted_entities().is_empty());
}

#[tokio::test]
async fn missing_source_record_fails_the_update() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(standard_processor(base_caches(), upsert.clone()));
    let report = executor
        .run_updates(vec![change("ghost", "jobcode")])
        .await
        .unwrap();

    assert_eq!(report.failed_count, 1);
    assert!(
        report.users[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("No source record for user 'ghost'")
    );
}

#[tokio::test]
async fn hiredate_change_rewrites_the_employment_row_only() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(standard_processor(caches_with_employment(), upsert.clone()));
    let report = executor
        .run_updates(vec![change("u100", "hiredate")])
        .await
        .unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(upsert.submitted_entities(), vec![Entity::EmpEmployment]);
    match &upsert.payloads_for(Entity::EmpEmployment, "u100")[0] {
        EntityPayload::EmpEmployment(e) => {
            assert_eq!(e.start_date, date(2021, 6, 1));
            assert_eq!(e.original_start_date, date(2020, 1, 1));
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert!(upsert.single_position_calls().is_empty());
}
