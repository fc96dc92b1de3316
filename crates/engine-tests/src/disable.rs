use crate::support::*;
use engine_processing::processor::DisableRequest;
use engine_runtime::executor::Executor;
use model::entity::Entity;
use model::payload::EntityPayload;

fn request(userid: &str) -> DisableRequest {
    DisableRequest {
        userid: userid.into(),
        end_date: date(2024, 12, 31),
    }
}

#[tokio::test]
async fn termination_is_written_before_the_login_is_disabled() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();

    let executor = Executor::new(disable_processor(base_caches(), upsert.clone()));
    let report = executor.run_disable(vec![request("u100")]).await.unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(
        upsert.submitted_entities(),
        vec![Entity::EmpEmploymentTermination, Entity::User]
    );
    match &upsert.payloads_for(Entity::User, "u100")[0] {
        EntityPayload::UserStatus(status) => assert_eq!(status.status, "inactive"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn failed_termination_leaves_the_login_active() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    upsert.fail(Entity::EmpEmploymentTermination, "u100");

    let executor = Executor::new(disable_processor(base_caches(), upsert.clone()));
    let report = executor.run_disable(vec![request("u100")]).await.unwrap();

    assert_eq!(report.failed_count, 1);
    assert!(upsert.users_submitted_for(Entity::User).is_empty());
    let user = &report.users[0];
    assert!(user.skipped_entities.contains(&Entity::User));
}

#[tokio::test]
async fn cross_referenced_logins_are_terminated_under_the_target_id() {
    init_tracing();
    let upsert = InMemoryUpsertService::new();
    let mut caches = base_caches();
    caches.cross_reference.insert("u100".into(), "ec900".into());

    let executor = Executor::new(disable_processor(caches, upsert.clone()));
    executor.run_disable(vec![request("U100")]).await.unwrap();

    match &upsert.payloads_for(Entity::EmpEmploymentTermination, "u100")[0] {
        EntityPayload::EmpEmploymentTermination(t) => {
            assert_eq!(t.user_id, "ec900");
            assert_eq!(t.person_id_external, "u100");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}
