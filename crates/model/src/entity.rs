use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Target-system record types. Each entity has its own upsert endpoint and
/// business-key uniqueness rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Entity {
    Position,
    PerPerson,
    EmpEmployment,
    EmpInitLoadJob,
    EmpJob,
    UserRole,
    PerPersonal,
    PositionMatrixRelationships,
    PerEmail,
    PerPhone,
    EmpJobRelationships,
    EmpEmploymentTermination,
    User,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Position => "Position",
            Entity::PerPerson => "PerPerson",
            Entity::EmpEmployment => "EmpEmployment",
            Entity::EmpInitLoadJob => "EmpInitLoadJob",
            Entity::EmpJob => "EmpJob",
            Entity::UserRole => "UserRole",
            Entity::PerPersonal => "PerPersonal",
            Entity::PositionMatrixRelationships => "PositionMatrixRelationships",
            Entity::PerEmail => "PerEmail",
            Entity::PerPhone => "PerPhone",
            Entity::EmpJobRelationships => "EmpJobRelationships",
            Entity::EmpEmploymentTermination => "EmpEmploymentTermination",
            Entity::User => "User",
        }
    }

    /// Relationship entities are secondary: the target system tolerates a
    /// missing relationship better than a missing primary record, so their
    /// submission failures are downgraded to warnings.
    pub fn is_relationship(&self) -> bool {
        matches!(
            self,
            Entity::PositionMatrixRelationships | Entity::EmpJobRelationships
        )
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown entity name '{0}'")]
pub struct ParseEntityError(String);

impl std::str::FromStr for Entity {
    type Err = ParseEntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Position" => Ok(Entity::Position),
            "PerPerson" => Ok(Entity::PerPerson),
            "EmpEmployment" => Ok(Entity::EmpEmployment),
            "EmpInitLoadJob" => Ok(Entity::EmpInitLoadJob),
            "EmpJob" => Ok(Entity::EmpJob),
            "UserRole" => Ok(Entity::UserRole),
            "PerPersonal" => Ok(Entity::PerPersonal),
            "PositionMatrixRelationships" => Ok(Entity::PositionMatrixRelationships),
            "PerEmail" => Ok(Entity::PerEmail),
            "PerPhone" => Ok(Entity::PerPhone),
            "EmpJobRelationships" => Ok(Entity::EmpJobRelationships),
            "EmpEmploymentTermination" => Ok(Entity::EmpEmploymentTermination),
            "User" => Ok(Entity::User),
            other => Err(ParseEntityError(other.to_string())),
        }
    }
}

/// Per-entity processing state for one employee. `Pending` is the initial
/// state; the other three are terminal and never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl EntityStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EntityStatus::Pending)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityStatus::Pending => "PENDING",
            EntityStatus::Success => "SUCCESS",
            EntityStatus::Failed => "FAILED",
            EntityStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}
