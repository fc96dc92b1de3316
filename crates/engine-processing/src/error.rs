use thiserror::Error;

/// Failures raised while building payloads for one user. These never abort
/// the run: the processor records them on the user's context, either as an
/// error or as a warning depending on the stage.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Job code '{jobcode}' does not exist")]
    UnknownJobCode { jobcode: String },

    #[error("Missing required fields for {entity}: {fields}")]
    MissingFields { entity: &'static str, fields: String },

    #[error("Cannot determine position code for user '{userid}'")]
    UnresolvedPosition { userid: String },

    #[error("Cannot determine position for related user '{userid}'")]
    UnresolvedRelatedPosition { userid: String },

    #[error("Cannot determine start date for {relationship} relationship of user '{userid}'")]
    UnresolvedRelationshipStart {
        relationship: &'static str,
        userid: String,
    },

    #[error("Cannot determine employment start date for user '{userid}'")]
    UnresolvedEmploymentStart { userid: String },

    #[error("No placeholder position and no organizational defaults for company '{company}'")]
    MissingPlaceholderDefaults { company: String },

    #[error("Placeholder position upsert for company '{company}' returned no usable code")]
    PlaceholderCreationFailed { company: String },
}
