use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The type of a cohort attribute, such as "Village" or "Phone Number".
///
/// Attribute searches are keyed by the type's `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CohortAttributeType {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A typed value attached to a cohort.
///
/// A cohort holds at most one active attribute per type. An attribute whose
/// value is `None` is a request to remove the existing attribute of that type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CohortAttribute {
    pub uuid: Uuid,
    pub attribute_type: CohortAttributeType,
    pub value: Option<String>,
    #[serde(default)]
    pub voided: bool,
}

impl CohortAttribute {
    pub fn new(attribute_type: CohortAttributeType, value: Option<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            attribute_type,
            value,
            voided: false,
        }
    }
}

/// Input for creating a new attribute type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCohortAttributeTypeInput {
    pub name: String,
    pub description: Option<String>,
}
