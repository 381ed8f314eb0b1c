//! The cohort REST resource.
//!
//! [`CohortResource`] decides what a cohort looks like on the wire and what a
//! client may write, and applies the few business rules that belong at this
//! layer. Storage is reached only through the injected [`CohortService`] and
//! [`LocationService`]; routing, authentication and serialization belong to
//! [`crate::api`].
//!
//! # Rules
//!
//! - Saving a voided cohort ends every membership: each member is voided with
//!   the reason `"Cohort Ended"` and takes the cohort's end date.
//! - A soft delete voids the cohort itself only. Memberships are left as they
//!   are until the cohort is next saved through [`CohortResource::save`].
//! - A search with a resolvable `location` returns that location's cohorts and
//!   ignores every other criterion.

mod error;
pub mod paging;
pub mod properties;
pub mod representation;
pub mod search;

use std::collections::HashMap;
use std::sync::Arc;

pub use error::{ResourceError, ResourceResult};
pub use paging::{NeedsPaging, Page, Paging};
pub use properties::{PropertyRule, PropertyRules};
pub use representation::{Depth, ResourceDescription, View};
pub use search::SearchCriteria;

use crate::models::*;
use crate::service::{CohortService, LocationService};

pub const REST_BASE: &str = "/ws/rest/v1";
pub const COHORT_NAMESPACE: &str = "cohortm";

/// Reason recorded on memberships ended by voiding their cohort.
pub const COHORT_ENDED: &str = "Cohort Ended";

pub fn resource_uri(resource: &str, uuid: &str) -> String {
    format!("{}/{}/{}", REST_BASE, resource, uuid)
}

pub fn cohort_uri(uuid: &str) -> String {
    format!("{}/{}/cohort/{}", REST_BASE, COHORT_NAMESPACE, uuid)
}

// ============================================================
// Request context
// ============================================================

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Authenticated { principal: String },
    Anonymous,
}

impl Caller {
    pub fn authenticated(principal: impl Into<String>) -> Self {
        Self::Authenticated {
            principal: principal.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// The parts of an inbound request the resource looks at.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    pub paging: Paging,
    params: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(caller: Caller, params: HashMap<String, String>, paging: Paging) -> Self {
        Self {
            caller,
            paging,
            params,
        }
    }

    /// Set a query parameter.
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The parameter's value, or `None` when it is missing or whitespace.
    pub fn non_blank_parameter(&self, name: &str) -> Option<&str> {
        self.parameter(name).filter(|v| !v.trim().is_empty())
    }
}

// ============================================================
// Resource
// ============================================================

#[derive(Clone)]
pub struct CohortResource {
    cohorts: Arc<dyn CohortService>,
    locations: Arc<dyn LocationService>,
}

impl CohortResource {
    pub fn new(cohorts: Arc<dyn CohortService>, locations: Arc<dyn LocationService>) -> Self {
        Self { cohorts, locations }
    }

    pub fn cohort_service(&self) -> &dyn CohortService {
        self.cohorts.as_ref()
    }

    pub fn location_service(&self) -> &dyn LocationService {
        self.locations.as_ref()
    }

    /// The properties and links rendered for `view`.
    ///
    /// Returns `Ok(None)` for views this resource does not describe.
    pub fn representation_description(
        &self,
        caller: &Caller,
        view: &View,
    ) -> ResourceResult<Option<ResourceDescription>> {
        if !caller.is_authenticated() {
            return Err(ResourceError::Unauthorized);
        }

        Ok(match view {
            View::Default => Some(representation::default_description()),
            View::Full => Some(representation::full_description()),
            View::Unsupported(_) => None,
        })
    }

    pub fn creatable_properties(&self) -> PropertyRules {
        writable_properties().optional("voided").optional("groupCohort")
    }

    pub fn updatable_properties(&self) -> ResourceResult<PropertyRules> {
        Ok(writable_properties()
            .optional("groupCohort")
            .optional("voided")
            .optional("voidReason"))
    }

    /// Persist a cohort, ending all of its memberships first if it is voided.
    pub fn save(&self, mut cohort: Cohort) -> ResourceResult<Cohort> {
        if cohort.voided {
            tracing::info!(
                "Ending {} memberships of voided cohort {}",
                cohort.cohort_members.len(),
                cohort.uuid
            );
            let end_date = cohort.end_date;
            for member in &mut cohort.cohort_members {
                member.voided = true;
                member.void_reason = Some(COHORT_ENDED.to_string());
                member.end_date = end_date;
            }
        }

        Ok(self.cohorts.save_cohort(cohort)?)
    }

    /// Void a cohort. Memberships are not touched.
    pub fn delete(&self, mut cohort: Cohort, reason: &str) -> ResourceResult<()> {
        cohort.voided = true;
        cohort.void_reason = Some(reason.to_string());
        tracing::info!("Voiding cohort {}: {}", cohort.uuid, reason);
        self.cohorts.save_cohort(cohort)?;
        Ok(())
    }

    /// Permanently remove a cohort.
    pub fn purge(&self, cohort: &Cohort) -> ResourceResult<()> {
        tracing::info!("Purging cohort {}", cohort.uuid);
        self.cohorts.purge_cohort(cohort)?;
        Ok(())
    }

    pub fn new_delegate(&self) -> Cohort {
        Cohort::new()
    }

    pub fn get_by_unique_id(&self, uuid: &str) -> ResourceResult<Option<Cohort>> {
        Ok(self.cohorts.get_cohort_by_uuid(uuid)?)
    }

    pub fn get_all(&self, context: &RequestContext) -> ResourceResult<NeedsPaging<Cohort>> {
        let cohorts = self.cohorts.get_all_cohorts()?;
        Ok(NeedsPaging::new(cohorts, context.paging))
    }

    pub fn search(&self, context: &RequestContext) -> ResourceResult<NeedsPaging<Cohort>> {
        let criteria = SearchCriteria::resolve(context, self.cohort_service(), self.location_service())?;

        if let Some(location) = &criteria.location {
            let cohorts = self.cohorts.get_cohorts_by_location_id(location.id)?;
            return Ok(NeedsPaging::new(cohorts, context.paging));
        }

        let cohorts = self.cohorts.find_cohorts_matching(
            criteria.query.as_deref(),
            criteria.attributes.as_ref(),
            criteria.cohort_type.as_ref(),
        )?;
        Ok(NeedsPaging::new(cohorts, context.paging))
    }

    /// Merge incoming attributes into a cohort, one per attribute type.
    ///
    /// An incoming attribute without a value removes the cohort's attribute of
    /// that type; with a value it overwrites the existing attribute in place,
    /// keeping its uuid. Attributes of a type the cohort does not have yet are
    /// added.
    pub fn set_attributes(
        &self,
        cohort: &mut Cohort,
        attributes: Vec<CohortAttribute>,
    ) -> ResourceResult<()> {
        for mut attribute in attributes {
            let type_uuid = attribute.attribute_type.uuid.to_string();
            let attribute_type = self
                .cohorts
                .get_cohort_attribute_type_by_uuid(&type_uuid)?
                .ok_or_else(|| {
                    ResourceError::ObjectNotFound(
                        "No Cohort Attribute Type found for that uuid".to_string(),
                    )
                })?;

            if let Some(existing) = cohort.attribute_mut(&attribute_type) {
                match attribute.value {
                    None => {
                        let uuid = existing.uuid;
                        cohort.remove_attribute(uuid);
                    }
                    Some(value) => existing.value = Some(value),
                }
            } else {
                attribute.attribute_type = attribute_type;
                cohort.add_attribute(attribute);
            }
        }
        Ok(())
    }

    pub fn display(cohort: &Cohort) -> String {
        cohort.name.clone()
    }
}

/// Properties shared by create and update. Required markers only apply to
/// create; updates are partial.
fn writable_properties() -> PropertyRules {
    PropertyRules::default()
        .required("name")
        .optional("description")
        .required("location")
        .required("startDate")
        .optional("endDate")
        .required("cohortType")
        .optional("attributes")
        .optional("cohortMembers")
}
