//! Query parameter handling for cohort search.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::error::{ResourceError, ResourceResult};
use super::RequestContext;
use crate::models::{CohortType, Location};
use crate::service::{CohortService, LocationService};

/// Parameters that turn a list request into a search.
pub const SEARCH_PARAMETERS: &[&str] = &["q", "attributes", "cohortType", "location"];

pub const INVALID_ATTRIBUTES: &str = "Invalid format for parameter 'attributes'";
pub const COHORT_TYPE_NOT_FOUND: &str =
    "No Cohort Type By Name/Uuid Found Matching The Supplied Parameter";
pub const LOCATION_NOT_FOUND: &str = "No Location found for that uuid";

/// Search criteria resolved from a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub query: Option<String>,
    pub attributes: Option<HashMap<String, String>>,
    pub cohort_type: Option<CohortType>,
    pub location: Option<Location>,
}

impl SearchCriteria {
    /// Parse and resolve the search parameters of a request.
    ///
    /// Parameters are handled in order `attributes`, `cohortType`, `location`;
    /// the first one that fails aborts the whole search. Blank parameters are
    /// treated as absent.
    pub fn resolve(
        context: &RequestContext,
        cohorts: &dyn CohortService,
        locations: &dyn LocationService,
    ) -> ResourceResult<Self> {
        let attributes = context
            .non_blank_parameter("attributes")
            .map(parse_attribute_query)
            .transpose()?;

        let cohort_type = match context.non_blank_parameter("cohortType") {
            Some(key) => resolve_cohort_type(cohorts, key)?,
            None => None,
        };

        let location = match context.non_blank_parameter("location") {
            Some(uuid) => resolve_location(locations, uuid)?,
            None => None,
        };

        Ok(Self {
            query: context.parameter("q").map(str::to_string),
            attributes,
            cohort_type,
            location,
        })
    }
}

/// Whether a request carries any search parameter.
pub fn is_search(context: &RequestContext) -> bool {
    SEARCH_PARAMETERS
        .iter()
        .any(|name| context.parameter(name).is_some())
}

/// Parse the `attributes` parameter: a JSON object body without its braces,
/// e.g. `"village":"Kisumu","ward":"3"`.
///
/// Keys and values may also be left unquoted (`village:Kisumu,ward:3`), and
/// numeric or boolean values are read as strings. Anything that is not a flat
/// mapping of names to scalars is rejected.
pub fn parse_attribute_query(raw: &str) -> ResourceResult<HashMap<String, String>> {
    let invalid = || ResourceError::InvalidParameter(INVALID_ATTRIBUTES.to_string());

    match serde_json::from_str::<Map<String, Value>>(&format!("{{{}}}", raw)) {
        Ok(object) => object
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key, s)),
                Value::Number(_) | Value::Bool(_) => Ok((key, value.to_string())),
                _ => Err(invalid()),
            })
            .collect(),
        Err(_) => parse_unquoted_pairs(raw).ok_or_else(invalid),
    }
}

fn parse_unquoted_pairs(raw: &str) -> Option<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    for segment in raw.split(',') {
        let (key, value) = segment.split_once(':')?;
        let key = unquote(key.trim())?;
        let value = unquote(value.trim())?;
        if key.is_empty() || value.is_empty() {
            return None;
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    Some(pairs)
}

/// Strip one pair of matching double quotes. Stray quotes, colons or
/// structural JSON characters mean the fragment is malformed: the unquoted
/// form has no escaping, so `a:1:2` and `a:"x,y"` are rejected and must be
/// sent as JSON (`"a":"1:2"`, `"a":"x,y"`).
fn unquote(s: &str) -> Option<&str> {
    let inner = match s.strip_prefix('"') {
        Some(rest) => rest.strip_suffix('"')?,
        None => s,
    };
    if inner.contains(['"', ':', '{', '}', '[', ']']) {
        return None;
    }
    Some(inner.trim())
}

/// Look up a cohort type by name, then by uuid.
pub fn resolve_cohort_type(
    cohorts: &dyn CohortService,
    key: &str,
) -> ResourceResult<Option<CohortType>> {
    let cohort_type = match cohorts.get_cohort_type_by_name(key)? {
        Some(t) => Some(t),
        None => cohorts.get_cohort_type_by_uuid(key)?,
    };

    cohort_type
        .map(Some)
        .ok_or_else(|| ResourceError::ObjectNotFound(COHORT_TYPE_NOT_FOUND.to_string()))
}

pub fn resolve_location(
    locations: &dyn LocationService,
    uuid: &str,
) -> ResourceResult<Option<Location>> {
    locations
        .get_location_by_uuid(uuid)?
        .map(Some)
        .ok_or_else(|| ResourceError::ObjectNotFound(LOCATION_NOT_FOUND.to_string()))
}
