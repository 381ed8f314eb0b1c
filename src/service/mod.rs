//! Collaborator ports consumed by the cohort resource.
//!
//! The resource never touches storage directly. Everything it persists or
//! looks up goes through these traits, which are injected when the resource is
//! constructed. [`crate::db::Database`] implements both.

use std::collections::HashMap;

use anyhow::Result;

use crate::models::*;

/// Persistence and lookup of cohorts and their reference data.
pub trait CohortService: Send + Sync {
    /// Insert or update a cohort together with its members and attributes.
    /// Returns the stored cohort, including server-assigned fields.
    fn save_cohort(&self, cohort: Cohort) -> Result<Cohort>;

    /// Permanently remove a cohort and everything it owns.
    fn purge_cohort(&self, cohort: &Cohort) -> Result<()>;

    fn get_cohort_by_uuid(&self, uuid: &str) -> Result<Option<Cohort>>;

    /// All non-voided cohorts.
    fn get_all_cohorts(&self) -> Result<Vec<Cohort>>;

    fn get_cohort_type_by_name(&self, name: &str) -> Result<Option<CohortType>>;

    fn get_cohort_type_by_uuid(&self, uuid: &str) -> Result<Option<CohortType>>;

    /// Non-voided cohorts based at the location with the given numeric id.
    fn get_cohorts_by_location_id(&self, location_id: i64) -> Result<Vec<Cohort>>;

    /// Non-voided cohorts matching every supplied criterion.
    ///
    /// - `query` matches the name or description, ignored when blank.
    /// - `attributes` maps attribute type names to required values.
    /// - `cohort_type` restricts results to one type.
    fn find_cohorts_matching(
        &self,
        query: Option<&str>,
        attributes: Option<&HashMap<String, String>>,
        cohort_type: Option<&CohortType>,
    ) -> Result<Vec<Cohort>>;

    fn get_cohort_attribute_type_by_uuid(&self, uuid: &str)
        -> Result<Option<CohortAttributeType>>;
}

/// Lookup of locations.
pub trait LocationService: Send + Sync {
    fn get_location_by_uuid(&self, uuid: &str) -> Result<Option<Location>>;
}
