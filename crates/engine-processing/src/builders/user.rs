use chrono::NaiveDate;
use model::payload::{
    EmpEmploymentTerminationPayload, TERMINATION_EVENT_REASON, UserRolePayload, UserStatusPayload,
};

pub fn role_payload(ec_user_id: &str, role: &str) -> UserRolePayload {
    UserRolePayload {
        user_id: ec_user_id.to_string(),
        custom08: role.to_string(),
    }
}

pub fn inactive_payload(ec_user_id: &str) -> UserStatusPayload {
    UserStatusPayload {
        user_id: ec_user_id.to_string(),
        status: "inactive".to_string(),
    }
}

pub fn termination_payload(
    ec_user_id: &str,
    person_id_external: &str,
    end_date: NaiveDate,
) -> EmpEmploymentTerminationPayload {
    EmpEmploymentTerminationPayload {
        user_id: ec_user_id.to_string(),
        person_id_external: person_id_external.to_string(),
        end_date,
        event_reason: TERMINATION_EVENT_REASON.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_uses_the_fixed_event_reason() {
        let payload = termination_payload(
            "ec100",
            "u100",
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        );
        assert_eq!(payload.event_reason, "TERRTMNT");
        assert_eq!(payload.user_id, "ec100");
        assert_eq!(payload.person_id_external, "u100");
    }

    #[test]
    fn inactive_payload_targets_the_login() {
        let payload = inactive_payload("ec100");
        assert_eq!(payload.status, "inactive");
    }
}
