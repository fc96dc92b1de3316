use chrono::NaiveDate;
use model::payload::{
    EmpEmploymentPayload, EmpJobPayload, EmpJobRelationshipPayload, EventReason, RelationKind,
    WriteOperation,
};

/// Sentinel login written as managerId when no real manager resolves.
pub const NO_MANAGER: &str = "NO_MANAGER";

/// Builds the employment payload pair for one job event.
///
/// Date rules: the hire date is always the earliest date of the pair (the
/// two are swapped if the source delivers them reversed); the job row start
/// never backdates below the manager's position start, and when the employee
/// already has a newer job row the event is dated today instead of in the
/// past.
pub struct EmploymentBuilder {
    pub ec_user_id: String,
    pub person_id_external: String,
    pub hire_date: NaiveDate,
    pub start_of_employment: NaiveDate,
    pub seq_number: i64,
    pub event_reason: EventReason,
    pub position: String,
    pub manager_id: String,
    pub company: Option<String>,
    pub cost_center: Option<String>,
    pub role_code: Option<String>,
    pub last_job_start: Option<NaiveDate>,
    pub manager_position_start: Option<NaiveDate>,
}

impl EmploymentBuilder {
    pub fn dates_swapped(&self) -> bool {
        self.hire_date > self.start_of_employment
    }

    fn normalized(&self) -> (NaiveDate, NaiveDate) {
        if self.dates_swapped() {
            (self.hire_date, self.start_of_employment)
        } else {
            (self.start_of_employment, self.hire_date)
        }
    }

    pub fn build_employment(&self) -> EmpEmploymentPayload {
        let (start, hire) = self.normalized();
        EmpEmploymentPayload {
            user_id: self.ec_user_id.clone(),
            person_id_external: self.person_id_external.clone(),
            start_date: start,
            original_start_date: hire,
            service_date: hire,
            custom_string8: self.role_code.clone(),
        }
    }

    /// Builds the job row and returns it together with the calculated start
    /// date, which the position-to-job sync reuses.
    pub fn build_job(&self, today: NaiveDate) -> (EmpJobPayload, NaiveDate) {
        let (start, hire) = self.normalized();
        let mut calculated = match self.event_reason {
            EventReason::InitLoad => hire,
            EventReason::DataChange => start,
        };
        if let Some(manager_start) = self.manager_position_start {
            if manager_start > calculated {
                calculated = manager_start;
            }
        }
        if let Some(last_start) = self.last_job_start {
            if last_start > calculated {
                calculated = today;
            }
        }
        let payload = EmpJobPayload {
            user_id: self.ec_user_id.clone(),
            position: self.position.clone(),
            start_date: calculated,
            event_reason: self.event_reason,
            seq_number: self.seq_number,
            manager_id: self.manager_id.clone(),
            company: self.company.clone(),
            cost_center: self.cost_center.clone(),
        };
        (payload, calculated)
    }
}

pub fn relationship_create(
    ec_user_id: &str,
    kind: RelationKind,
    rel_user_id: &str,
    start_date: NaiveDate,
) -> EmpJobRelationshipPayload {
    EmpJobRelationshipPayload {
        user_id: ec_user_id.to_string(),
        start_date,
        relationship: kind,
        rel_user_id: rel_user_id.to_string(),
        operation: None,
    }
}

/// Closes an existing relationship row before a replacement is created.
pub fn relationship_delimit(
    ec_user_id: &str,
    kind: RelationKind,
    old_rel_user_id: &str,
    start_date: NaiveDate,
) -> EmpJobRelationshipPayload {
    EmpJobRelationshipPayload {
        user_id: ec_user_id.to_string(),
        start_date,
        relationship: kind,
        rel_user_id: old_rel_user_id.to_string(),
        operation: Some(WriteOperation::Delimit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn builder() -> EmploymentBuilder {
        EmploymentBuilder {
            ec_user_id: "u100".into(),
            person_id_external: "u100".into(),
            hire_date: date(2020, 1, 1),
            start_of_employment: date(2021, 6, 1),
            seq_number: 1,
            event_reason: EventReason::InitLoad,
            position: "P1".into(),
            manager_id: NO_MANAGER.into(),
            company: Some("1710".into()),
            cost_center: Some("CC1".into()),
            role_code: None,
            last_job_start: None,
            manager_position_start: None,
        }
    }

    #[test]
    fn employment_dates_split_into_start_and_service() {
        let payload = builder().build_employment();
        assert_eq!(payload.start_date, date(2021, 6, 1));
        assert_eq!(payload.original_start_date, date(2020, 1, 1));
        assert_eq!(payload.service_date, date(2020, 1, 1));
    }

    #[test]
    fn reversed_dates_are_swapped() {
        let mut b = builder();
        b.hire_date = date(2022, 3, 1);
        b.start_of_employment = date(2021, 6, 1);
        assert!(b.dates_swapped());
        let payload = b.build_employment();
        assert_eq!(payload.start_date, date(2022, 3, 1));
        assert_eq!(payload.original_start_date, date(2021, 6, 1));
    }

    #[test]
    fn init_load_uses_hire_date_and_data_change_uses_start() {
        let today = date(2024, 9, 1);
        let (job, calculated) = builder().build_job(today);
        assert_eq!(job.start_date, date(2020, 1, 1));
        assert_eq!(calculated, date(2020, 1, 1));

        let mut b = builder();
        b.event_reason = EventReason::DataChange;
        let (job, _) = b.build_job(today);
        assert_eq!(job.start_date, date(2021, 6, 1));
    }

    #[test]
    fn manager_position_start_lifts_the_job_start() {
        let mut b = builder();
        b.manager_position_start = Some(date(2022, 1, 1));
        let (job, calculated) = b.build_job(date(2024, 9, 1));
        assert_eq!(job.start_date, date(2022, 1, 1));
        assert_eq!(calculated, date(2022, 1, 1));
    }

    #[test]
    fn newer_existing_job_row_moves_the_event_to_today() {
        let today = date(2024, 9, 1);
        let mut b = builder();
        b.event_reason = EventReason::DataChange;
        b.last_job_start = Some(date(2023, 12, 1));
        let (job, calculated) = b.build_job(today);
        assert_eq!(job.start_date, today);
        assert_eq!(calculated, today);
    }

    #[test]
    fn delimit_closes_the_old_relation_user() {
        let payload =
            relationship_delimit("u100", RelationKind::HrManager, "old_hr", date(2023, 1, 1));
        assert_eq!(payload.operation, Some(WriteOperation::Delimit));
        assert_eq!(payload.rel_user_id, "old_hr");
        assert_eq!(payload.start_date, date(2023, 1, 1));
    }
}
