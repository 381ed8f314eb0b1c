use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A place a cohort can be based at.
///
/// Locations carry a numeric `id` alongside their uuid; cohorts are filtered by
/// the numeric id once a location has been resolved from its uuid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub retired: bool,
}

/// Input for creating a new location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLocationInput {
    pub name: String,
    pub description: Option<String>,
}
