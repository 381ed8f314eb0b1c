use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attribute::{CohortAttribute, CohortAttributeType};
use super::cohort_type::CohortType;
use super::location::Location;
use super::member::CohortMember;

/// A named group of patients.
///
/// A cohort has a type and a location, a start date and an optional end date,
/// a set of typed attributes, and a list of membership records. Cohorts are
/// never removed by a normal delete: they are voided with a reason and stay in
/// storage until explicitly purged.
///
/// # Ownership
/// Members and attributes belong to exactly one cohort and are replaced as a
/// whole whenever the cohort is saved. The location and cohort type are
/// references and are only ever looked up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Option<Location>,
    pub cohort_type: Option<CohortType>,
    pub attributes: Vec<CohortAttribute>,
    pub cohort_members: Vec<CohortMember>,
    /// Whether the cohort represents a group (e.g. a household) rather than a
    /// program enrolment.
    pub group_cohort: bool,
    pub voided: bool,
    pub void_reason: Option<String>,
    pub audit_info: AuditInfo,
}

/// Server-assigned timestamps, rendered as `auditInfo` in the full view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    pub date_created: Option<DateTime<Utc>>,
    pub date_changed: Option<DateTime<Utc>>,
    pub date_voided: Option<DateTime<Utc>>,
}

impl Cohort {
    /// A blank, unsaved cohort with a fresh uuid.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            description: None,
            start_date: None,
            end_date: None,
            location: None,
            cohort_type: None,
            attributes: Vec::new(),
            cohort_members: Vec::new(),
            group_cohort: false,
            voided: false,
            void_reason: None,
            audit_info: AuditInfo::default(),
        }
    }

    /// The non-voided attribute of the given type, if the cohort has one.
    pub fn attribute_mut(
        &mut self,
        attribute_type: &CohortAttributeType,
    ) -> Option<&mut CohortAttribute> {
        self.attributes
            .iter_mut()
            .find(|a| !a.voided && a.attribute_type.uuid == attribute_type.uuid)
    }

    pub fn add_attribute(&mut self, attribute: CohortAttribute) {
        self.attributes.push(attribute);
    }

    pub fn remove_attribute(&mut self, uuid: Uuid) {
        self.attributes.retain(|a| a.uuid != uuid);
    }

    /// Attributes that have not been voided.
    pub fn active_attributes(&self) -> impl Iterator<Item = &CohortAttribute> {
        self.attributes.iter().filter(|a| !a.voided)
    }
}

impl Default for Cohort {
    fn default() -> Self {
        Self::new()
    }
}
