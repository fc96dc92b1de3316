use model::entity::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// How a run treats the incoming population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Day-to-day reconciliation of new hires and field changes.
    Standard,
    /// Initial load of an active population, staged through a placeholder
    /// position so job history starts from a known anchor.
    Migration,
    /// Initial load of an already-terminated population: migrate, then
    /// immediately write the termination row.
    MigrationInactive,
    /// Deactivate leavers: terminate employment and set the login inactive.
    Disable,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunMode::Standard => "standard",
            RunMode::Migration => "migration",
            RunMode::MigrationInactive => "migration-inactive",
            RunMode::Disable => "disable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("unknown run mode '{0}', expected standard, migration, migration-inactive or disable")]
pub struct ParseRunModeError(String);

impl std::str::FromStr for RunMode {
    type Err = ParseRunModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(RunMode::Standard),
            "migration" => Ok(RunMode::Migration),
            "migration-inactive" | "migration_inactive" => Ok(RunMode::MigrationInactive),
            "disable" => Ok(RunMode::Disable),
            other => Err(ParseRunModeError(other.to_string())),
        }
    }
}

/// The ordered submission plan for a run mode, plus the per-entity
/// dependencies gating submission. Entities are submitted strictly in plan
/// order; an entity is only submitted for a user once all of its
/// dependencies reached SUCCESS for that user.
#[derive(Debug, Clone)]
pub struct ExecutionProfile {
    mode: RunMode,
    plan: Vec<Entity>,
    dependencies: BTreeMap<Entity, Vec<Entity>>,
}

impl ExecutionProfile {
    pub fn for_mode(mode: RunMode) -> ExecutionProfile {
        let plan = match mode {
            RunMode::Standard => vec![
                Entity::Position,
                Entity::PerPerson,
                Entity::EmpEmployment,
                Entity::EmpJob,
                Entity::UserRole,
                Entity::PerPersonal,
                Entity::PositionMatrixRelationships,
                Entity::PerEmail,
                Entity::PerPhone,
                Entity::EmpJobRelationships,
            ],
            RunMode::Migration => vec![
                Entity::Position,
                Entity::PerPerson,
                Entity::EmpEmployment,
                Entity::EmpInitLoadJob,
                Entity::EmpJob,
                Entity::UserRole,
                Entity::PerPersonal,
                Entity::PositionMatrixRelationships,
                Entity::PerEmail,
                Entity::PerPhone,
                Entity::EmpJobRelationships,
            ],
            RunMode::MigrationInactive => vec![
                Entity::Position,
                Entity::PerPerson,
                Entity::EmpEmployment,
                Entity::EmpInitLoadJob,
                Entity::EmpJob,
                Entity::PerPersonal,
                Entity::EmpEmploymentTermination,
            ],
            RunMode::Disable => vec![Entity::EmpEmploymentTermination, Entity::User],
        };

        let mut dependencies: BTreeMap<Entity, Vec<Entity>> = BTreeMap::new();
        for entity in &plan {
            let deps = match entity {
                Entity::Position | Entity::PerPerson => vec![],
                Entity::PerPersonal | Entity::PerEmail | Entity::PerPhone | Entity::UserRole => {
                    vec![Entity::PerPerson]
                }
                Entity::PositionMatrixRelationships
                | Entity::EmpEmployment
                | Entity::EmpJobRelationships => vec![Entity::Position, Entity::PerPerson],
                Entity::EmpInitLoadJob => vec![Entity::Position, Entity::PerPerson],
                Entity::EmpJob => match mode {
                    RunMode::Migration | RunMode::MigrationInactive => {
                        vec![Entity::Position, Entity::PerPerson, Entity::EmpInitLoadJob]
                    }
                    _ => vec![Entity::Position, Entity::PerPerson],
                },
                Entity::EmpEmploymentTermination => match mode {
                    RunMode::Disable => vec![],
                    _ => vec![Entity::EmpEmployment, Entity::PerPerson],
                },
                Entity::User => vec![Entity::EmpEmploymentTermination],
            };
            dependencies.insert(*entity, deps);
        }

        ExecutionProfile {
            mode,
            plan,
            dependencies,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn plan(&self) -> &[Entity] {
        &self.plan
    }

    pub fn includes(&self, entity: Entity) -> bool {
        self.plan.contains(&entity)
    }

    pub fn dependencies_of(&self, entity: Entity) -> &[Entity] {
        self.dependencies
            .get(&entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Maps a changed source field to the target entities that must be rewritten.
/// Unknown fields are not an error; callers downgrade them to a warning.
pub fn entities_for_dirty_field(field: &str) -> Option<&'static [Entity]> {
    let entities: &'static [Entity] = match field {
        "jobcode" => &[Entity::Position],
        "manager" => &[Entity::Position, Entity::EmpJob],
        "matrix_manager" | "hr" => &[
            Entity::PositionMatrixRelationships,
            Entity::EmpJobRelationships,
        ],
        "start_of_employment" | "hiredate" => &[Entity::EmpEmployment],
        "date_of_position" => &[Entity::PerPersonal, Entity::EmpJobRelationships],
        "date_of_birth" => &[Entity::PerPerson],
        "firstname" | "lastname" | "mi" | "nickname" | "gender" => &[Entity::PerPersonal],
        "email" | "private_email" => &[Entity::PerEmail],
        "biz_phone" | "phone" => &[Entity::PerPhone],
        "custom_string_8" => &[Entity::UserRole],
        _ => return None,
    };
    Some(entities)
}
