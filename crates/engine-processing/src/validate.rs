use model::record::EmployeeRecord;

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Fields a position creation cannot do without.
pub fn missing_position_fields(record: &EmployeeRecord) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !present(&record.jobcode) {
        missing.push("jobcode");
    }
    if !present(&record.address_code) {
        missing.push("address_code");
    }
    if !present(&record.cost_center) {
        missing.push("cost_center");
    }
    if !present(&record.country_code) {
        missing.push("country_code");
    }
    if !present(&record.company) {
        missing.push("company");
    }
    missing
}

/// Fields a person creation cannot do without.
pub fn missing_person_fields(record: &EmployeeRecord) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !present(&record.firstname) {
        missing.push("firstname");
    }
    if !present(&record.lastname) {
        missing.push("lastname");
    }
    if record.userid.trim().is_empty() {
        missing.push("userid");
    }
    if record.date_of_birth.is_none() {
        missing.push("date_of_birth");
    }
    if record.date_of_position.is_none() {
        missing.push("date_of_position");
    }
    if !present(&record.email) {
        missing.push("email");
    }
    missing
}
