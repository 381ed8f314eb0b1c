use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a cohort. Names are unique, so a type can be looked up
/// either by name or by uuid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CohortType {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Input for creating a new cohort type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCohortTypeInput {
    pub name: String,
    pub description: Option<String>,
}
