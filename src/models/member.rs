use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership of a patient in a cohort.
///
/// A membership ends either when its own end date passes or when the owning
/// cohort is voided, in which case it is voided with the reason
/// `"Cohort Ended"` and takes the cohort's end date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CohortMember {
    pub uuid: Uuid,
    /// The patient this membership is for.
    #[serde(rename = "patient")]
    pub patient_uuid: Uuid,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub voided: bool,
    pub void_reason: Option<String>,
}

impl CohortMember {
    pub fn new(patient_uuid: Uuid) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            patient_uuid,
            start_date: None,
            end_date: None,
            voided: false,
            void_reason: None,
        }
    }
}
