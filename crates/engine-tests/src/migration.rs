use crate::support::*;
use engine_runtime::executor::Executor;
use model::entity::Entity;
use model::payload::{EntityPayload, EventReason};

#[tokio::test]
async fn placeholder_position_is_created_once_per_company() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(migration_processor(base_caches(), upsert.clone(), false));
    let report = executor
        .run_creation(vec![new_hire("u100"), new_hire("u200")])
        .await
        .unwrap();
    assert_eq!(report.failed_count, 0);

    // One out-of-band placeholder creation (no code yet), plus one date sync
    // per migrated user.
    let singles = upsert.single_position_calls();
    let placeholders: Vec<_> = singles
        .iter()
        .filter(|payload| match payload {
            EntityPayload::Position(p) => p.code.is_none(),
            _ => false,
        })
        .collect();
    assert_eq!(placeholders.len(), 1);
    assert_eq!(singles.len(), 3);
}

#[tokio::test]
async fn init_load_job_runs_between_employment_and_real_job() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(migration_processor(base_caches(), upsert.clone(), false));
    executor.run_creation(vec![new_hire("u100")]).await.unwrap();

    let entities = upsert.submitted_entities();
    let employment = entities
        .iter()
        .position(|e| *e == Entity::EmpEmployment)
        .unwrap();
    let init = entities
        .iter()
        .position(|e| *e == Entity::EmpInitLoadJob)
        .unwrap();
    let job = entities.iter().position(|e| *e == Entity::EmpJob).unwrap();
    assert!(employment < init);
    assert!(init < job);

    // Sequence 1 on the placeholder, sequence 2 on the real position.
    match &upsert.payloads_for(Entity::EmpInitLoadJob, "u100")[0] {
        EntityPayload::EmpInitLoadJob(init) => {
            assert_eq!(init.position, "1020001");
            assert_eq!(init.seq_number, 1);
            assert_eq!(init.event_reason, EventReason::InitLoad);
            assert_eq!(init.manager_id, "NO_MANAGER");
        }
        other => panic!("unexpected payload {other:?}"),
    }
    match &upsert.payloads_for(Entity::EmpJob, "u100")[0] {
        EntityPayload::EmpJob(job) => {
            assert_eq!(job.position, "1020002");
            assert_eq!(job.seq_number, 2);
            assert_eq!(job.event_reason, EventReason::DataChange);
            assert_eq!(job.manager_id, "NO_MANAGER");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn already_migrated_users_skip_the_employment_rows() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let mut caches = base_caches();
    caches.employees.push(engine_core::cache::EmploymentRow {
        userid: "u100".into(),
        position: Some("P_REAL".into()),
        seq_number: Some(2),
        start_date: Some(date(2021, 6, 1)),
    });

    let executor = Executor::new(migration_processor(caches, upsert.clone(), false));
    let report = executor.run_creation(vec![new_hire("u100")]).await.unwrap();

    assert_eq!(report.failed_count, 0);
    assert!(upsert.users_submitted_for(Entity::EmpEmployment).is_empty());
    assert!(upsert.users_submitted_for(Entity::EmpInitLoadJob).is_empty());
    assert!(upsert.users_submitted_for(Entity::EmpJob).is_empty());
}

#[tokio::test]
async fn inactive_migration_terminates_after_the_job_rows() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let mut record = new_hire("u100");
    record.leaving_date = Some(date(2024, 12, 31));

    let executor = Executor::new(migration_processor(base_caches(), upsert.clone(), true));
    let report = executor.run_creation(vec![record]).await.unwrap();
    assert_eq!(report.success_count, 1);

    let entities = upsert.submitted_entities();
    let job = entities.iter().position(|e| *e == Entity::EmpJob).unwrap();
    let termination = entities
        .iter()
        .position(|e| *e == Entity::EmpEmploymentTermination)
        .unwrap();
    assert!(job < termination);

    match &upsert.payloads_for(Entity::EmpEmploymentTermination, "u100")[0] {
        EntityPayload::EmpEmploymentTermination(t) => {
            assert_eq!(t.end_date, date(2024, 12, 31));
            assert_eq!(t.event_reason, "TERRTMNT");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn inactive_migration_without_leaving_date_fails_the_user() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(migration_processor(base_caches(), upsert.clone(), true));
    let report = executor.run_creation(vec![new_hire("u100")]).await.unwrap();

    assert_eq!(report.failed_count, 1);
    assert!(
        upsert
            .users_submitted_for(Entity::EmpEmploymentTermination)
            .is_empty()
    );
}
