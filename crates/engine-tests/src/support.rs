use async_trait::async_trait;
use chrono::NaiveDate;
use engine_core::cache::{JobMapping, ReferenceCaches};
use engine_core::error::ServiceError;
use engine_core::services::{
    BulkUpsertService, HistorySink, NotificationSink, SnapshotProvider, SnapshotRefresh,
};
use engine_core::summary::RunReport;
use engine_processing::policy::EmailPolicy;
use engine_processing::processor::Processor;
use engine_processing::strategy::{
    MigrationConfig, MigrationStrategy, OrgUnitDefaults, RunStrategy, StandardStrategy,
};
use model::contact::EmailAction;
use model::entity::Entity;
use model::outcome::UpsertOutcome;
use model::payload::EntityPayload;
use model::record::EmployeeRecord;
use planner::profile::{ExecutionProfile, RunMode};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, Once};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A fully valid new-hire record; tests unset what they want to break.
pub fn new_hire(userid: &str) -> EmployeeRecord {
    EmployeeRecord {
        userid: userid.into(),
        firstname: Some("Jane".into()),
        lastname: Some("Doe".into()),
        gender: Some("F".into()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2),
        hire_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        start_of_employment: NaiveDate::from_ymd_opt(2021, 6, 1),
        date_of_position: NaiveDate::from_ymd_opt(2021, 6, 1),
        company: Some("1710".into()),
        cost_center: Some("CC1".into()),
        jobcode: Some("J42".into()),
        address_code: Some("LOC1".into()),
        country_code: Some("DE".into()),
        country_iso3: Some("276".into()),
        email: Some(format!("{userid}@elsewhere.org")),
        ..Default::default()
    }
}

pub fn base_caches() -> ReferenceCaches {
    let mut caches = ReferenceCaches::default();
    caches.job_mappings.push(JobMapping {
        jobcode: "J42".into(),
        division: Some("DIV7".into()),
        geographical_scope: Some("EMEA".into()),
        sub_unit: Some("SU3".into()),
    });
    caches
}

pub fn standard_processor(
    caches: ReferenceCaches,
    upsert: Arc<InMemoryUpsertService>,
) -> Processor {
    processor_with(
        ExecutionProfile::for_mode(RunMode::Standard),
        Box::new(StandardStrategy),
        caches,
        upsert,
    )
}

pub fn migration_processor(
    caches: ReferenceCaches,
    upsert: Arc<InMemoryUpsertService>,
    inactive: bool,
) -> Processor {
    let config = MigrationConfig {
        placeholder_jobcode: "MIG".into(),
        fallback_org: Some(OrgUnitDefaults {
            division: "DIV7".into(),
            geographical_scope: "EMEA".into(),
            sub_unit: "SU3".into(),
        }),
    };
    let (profile, strategy): (ExecutionProfile, Box<dyn RunStrategy>) = if inactive {
        (
            ExecutionProfile::for_mode(RunMode::MigrationInactive),
            Box::new(MigrationStrategy::inactive(config)),
        )
    } else {
        (
            ExecutionProfile::for_mode(RunMode::Migration),
            Box::new(MigrationStrategy::new(config)),
        )
    };
    processor_with(profile, strategy, caches, upsert)
}

pub fn disable_processor(
    caches: ReferenceCaches,
    upsert: Arc<InMemoryUpsertService>,
) -> Processor {
    processor_with(
        ExecutionProfile::for_mode(RunMode::Disable),
        Box::new(StandardStrategy),
        caches,
        upsert,
    )
}

fn processor_with(
    profile: ExecutionProfile,
    strategy: Box<dyn RunStrategy>,
    caches: ReferenceCaches,
    upsert: Arc<InMemoryUpsertService>,
) -> Processor {
    Processor::new(
        profile,
        strategy,
        EmailPolicy::new("corp.example"),
        caches,
        upsert as Arc<dyn BulkUpsertService>,
    )
}

/// Target-system stand-in: answers every upsert with SUCCESS (fabricating
/// position keys the way the real endpoint does) unless a failure was
/// scripted for an (entity, user) pair. Records every call for assertions.
pub struct InMemoryUpsertService {
    bulk_calls: Mutex<Vec<(Entity, BTreeMap<String, Vec<EntityPayload>>)>>,
    single_calls: Mutex<Vec<(Entity, EntityPayload)>>,
    fail_on: Mutex<BTreeSet<(Entity, String)>>,
    next_position_code: Mutex<u64>,
}

impl InMemoryUpsertService {
    pub fn new() -> Arc<InMemoryUpsertService> {
        Arc::new(InMemoryUpsertService {
            bulk_calls: Mutex::new(Vec::new()),
            single_calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(BTreeSet::new()),
            next_position_code: Mutex::new(1020000),
        })
    }

    pub fn fail(&self, entity: Entity, userid: &str) {
        self.fail_on
            .lock()
            .unwrap()
            .insert((entity, userid.to_string()));
    }

    /// Entities in bulk submission order, one element per call.
    pub fn submitted_entities(&self) -> Vec<Entity> {
        self.bulk_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(entity, _)| *entity)
            .collect()
    }

    /// All users an entity was submitted for, across calls, in call order.
    pub fn users_submitted_for(&self, entity: Entity) -> Vec<String> {
        self.bulk_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == entity)
            .flat_map(|(_, payloads)| payloads.keys().cloned())
            .collect()
    }

    /// All payloads submitted for one user and entity, across calls.
    pub fn payloads_for(&self, entity: Entity, userid: &str) -> Vec<EntityPayload> {
        self.bulk_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == entity)
            .flat_map(|(_, payloads)| payloads.get(userid).cloned().unwrap_or_default())
            .collect()
    }

    /// One element per PerEmail bulk call: the action chunk it carried.
    pub fn email_rounds(&self) -> Vec<EmailAction> {
        self.bulk_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(entity, _)| *entity == Entity::PerEmail)
            .filter_map(|(_, payloads)| {
                payloads.values().flatten().next().map(|p| match p {
                    EntityPayload::PerEmail(write) => write.action,
                    other => panic!("non-email payload in email round: {other:?}"),
                })
            })
            .collect()
    }

    pub fn single_position_calls(&self) -> Vec<EntityPayload> {
        self.single_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(entity, _)| *entity == Entity::Position)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn outcome_for(&self, entity: Entity, userid: &str) -> UpsertOutcome {
        if self
            .fail_on
            .lock()
            .unwrap()
            .contains(&(entity, userid.to_string()))
        {
            return UpsertOutcome::failed("Scripted failure", 500);
        }
        match entity {
            Entity::Position => {
                let mut next = self.next_position_code.lock().unwrap();
                *next += 1;
                UpsertOutcome::success(Some(format!(
                    "Position/code={},Position/effectiveStartDate=1900-01-01",
                    *next
                )))
            }
            _ => UpsertOutcome::success(None),
        }
    }
}

#[async_trait]
impl BulkUpsertService for InMemoryUpsertService {
    async fn upsert_for_users(
        &self,
        entity: Entity,
        payloads: &BTreeMap<String, Vec<EntityPayload>>,
    ) -> Result<BTreeMap<String, UpsertOutcome>, ServiceError> {
        self.bulk_calls
            .lock()
            .unwrap()
            .push((entity, payloads.clone()));
        Ok(payloads
            .keys()
            .map(|userid| (userid.clone(), self.outcome_for(entity, userid)))
            .collect())
    }

    async fn upsert_one(
        &self,
        entity: Entity,
        payload: &EntityPayload,
    ) -> Result<UpsertOutcome, ServiceError> {
        self.single_calls
            .lock()
            .unwrap()
            .push((entity, payload.clone()));
        Ok(self.outcome_for(entity, ""))
    }
}

pub struct StaticSnapshots {
    refresh: SnapshotRefresh,
    pub calls: Mutex<usize>,
}

impl StaticSnapshots {
    pub fn new(refresh: SnapshotRefresh) -> Arc<StaticSnapshots> {
        Arc::new(StaticSnapshots {
            refresh,
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshots {
    async fn refresh(&self) -> Result<SnapshotRefresh, ServiceError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.refresh.clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub reports: Mutex<Vec<RunReport>>,
}

impl RecordingSink {
    pub fn new() -> Arc<RecordingSink> {
        Arc::new(RecordingSink::default())
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

#[async_trait]
impl HistorySink for RecordingSink {
    async fn record_run(&self, report: &RunReport) -> Result<(), ServiceError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, report: &RunReport) -> Result<(), ServiceError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}
