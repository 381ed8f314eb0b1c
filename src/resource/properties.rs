//! Property registry for the cohort resource.
//!
//! Each wire property maps to a getter used when rendering and, when the
//! property is writable, a setter used when binding a request body onto a
//! [`Cohort`]. Which properties may be written, and which are required, is
//! decided separately by [`PropertyRules`].

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::error::{ResourceError, ResourceResult};
use super::representation::{
    attribute_json, cohort_type_json, location_json, member_json, Depth,
};
use super::search::{resolve_cohort_type, resolve_location};
use super::CohortResource;
use crate::models::*;

pub type Getter = fn(&Cohort, Depth) -> Value;
pub type Setter = fn(&CohortResource, &mut Cohort, Value) -> ResourceResult<()>;

pub struct PropertyAccessor {
    pub name: &'static str,
    pub get: Getter,
    pub set: Option<Setter>,
}

static ACCESSORS: &[PropertyAccessor] = &[
    PropertyAccessor { name: "uuid", get: get_uuid, set: None },
    PropertyAccessor { name: "display", get: get_display, set: None },
    PropertyAccessor { name: "name", get: get_name, set: Some(set_name) },
    PropertyAccessor { name: "description", get: get_description, set: Some(set_description) },
    PropertyAccessor { name: "startDate", get: get_start_date, set: Some(set_start_date) },
    PropertyAccessor { name: "endDate", get: get_end_date, set: Some(set_end_date) },
    PropertyAccessor { name: "location", get: get_location, set: Some(set_location) },
    PropertyAccessor { name: "cohortType", get: get_cohort_type, set: Some(set_cohort_type) },
    PropertyAccessor { name: "attributes", get: get_attributes, set: Some(set_attributes) },
    PropertyAccessor { name: "cohortMembers", get: get_members, set: Some(set_members) },
    PropertyAccessor { name: "groupCohort", get: get_group_cohort, set: Some(set_group_cohort) },
    PropertyAccessor { name: "voided", get: get_voided, set: Some(set_voided) },
    PropertyAccessor { name: "voidReason", get: get_void_reason, set: Some(set_void_reason) },
    PropertyAccessor { name: "auditInfo", get: get_audit_info, set: None },
];

pub fn accessor(name: &str) -> Option<&'static PropertyAccessor> {
    ACCESSORS.iter().find(|a| a.name == name)
}

// ============================================================
// Property rules
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRule {
    pub name: &'static str,
    pub required: bool,
}

/// The properties a create or update request may set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyRules {
    rules: Vec<PropertyRule>,
}

impl PropertyRules {
    pub fn required(mut self, name: &'static str) -> Self {
        self.rules.push(PropertyRule { name, required: true });
        self
    }

    pub fn optional(mut self, name: &'static str) -> Self {
        self.rules.push(PropertyRule { name, required: false });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name && r.required)
    }

    pub fn required_names(&self) -> Vec<&'static str> {
        self.rules.iter().filter(|r| r.required).map(|r| r.name).collect()
    }

    /// Check a request body against these rules.
    ///
    /// Unknown properties are always rejected. Required properties must be
    /// present and non-null only when `creating`; updates are partial.
    pub fn validate(&self, body: &Map<String, Value>, creating: bool) -> ResourceResult<()> {
        let mut not_allowed: Vec<&str> = body
            .keys()
            .map(String::as_str)
            .filter(|k| !self.contains(k))
            .collect();
        if !not_allowed.is_empty() {
            not_allowed.sort_unstable();
            return Err(ResourceError::Validation(format!(
                "Some properties are not allowed to be set: {}",
                not_allowed.join(", ")
            )));
        }

        if creating {
            let missing: Vec<&str> = self
                .required_names()
                .into_iter()
                .filter(|name| body.get(*name).map_or(true, Value::is_null))
                .collect();
            if !missing.is_empty() {
                return Err(ResourceError::Validation(format!(
                    "Some required properties are missing: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(())
    }
}

/// Apply every property of a validated body to `cohort` through its setter.
pub fn bind(
    resource: &CohortResource,
    cohort: &mut Cohort,
    body: Map<String, Value>,
) -> ResourceResult<()> {
    for (name, value) in body {
        let setter = accessor(&name).and_then(|a| a.set).ok_or_else(|| {
            ResourceError::Validation(format!("Property '{}' cannot be set", name))
        })?;
        setter(resource, cohort, value)?;
    }
    Ok(())
}

// ============================================================
// Getters
// ============================================================

fn get_uuid(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.uuid)
}

fn get_display(cohort: &Cohort, _: Depth) -> Value {
    json!(CohortResource::display(cohort))
}

fn get_name(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.name)
}

fn get_description(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.description)
}

fn get_start_date(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.start_date)
}

fn get_end_date(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.end_date)
}

fn get_location(cohort: &Cohort, depth: Depth) -> Value {
    cohort
        .location
        .as_ref()
        .map_or(Value::Null, |l| location_json(l, depth))
}

fn get_cohort_type(cohort: &Cohort, depth: Depth) -> Value {
    cohort
        .cohort_type
        .as_ref()
        .map_or(Value::Null, |t| cohort_type_json(t, depth))
}

fn get_attributes(cohort: &Cohort, depth: Depth) -> Value {
    Value::Array(
        cohort
            .active_attributes()
            .map(|a| attribute_json(a, depth))
            .collect(),
    )
}

fn get_members(cohort: &Cohort, depth: Depth) -> Value {
    Value::Array(
        cohort
            .cohort_members
            .iter()
            .map(|m| member_json(m, depth))
            .collect(),
    )
}

fn get_group_cohort(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.group_cohort)
}

fn get_voided(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.voided)
}

fn get_void_reason(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.void_reason)
}

fn get_audit_info(cohort: &Cohort, _: Depth) -> Value {
    json!(cohort.audit_info)
}

// ============================================================
// Setters
// ============================================================

fn set_name(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.name = expect_string("name", value)?;
    Ok(())
}

fn set_description(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.description = optional_string("description", value)?;
    Ok(())
}

fn set_start_date(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.start_date = optional_date("startDate", value)?;
    Ok(())
}

fn set_end_date(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.end_date = optional_date("endDate", value)?;
    Ok(())
}

fn set_location(resource: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.location = match reference_key("location", value)? {
        Some(uuid) => resolve_location(resource.location_service(), &uuid)?,
        None => None,
    };
    Ok(())
}

fn set_cohort_type(
    resource: &CohortResource,
    cohort: &mut Cohort,
    value: Value,
) -> ResourceResult<()> {
    cohort.cohort_type = match reference_key("cohortType", value)? {
        Some(key) => resolve_cohort_type(resource.cohort_service(), &key)?,
        None => None,
    };
    Ok(())
}

fn set_attributes(resource: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    let Value::Array(items) = value else {
        return Err(invalid("attributes", "an array"));
    };

    let attributes = items
        .into_iter()
        .map(|item| parse_attribute(cohort, item))
        .collect::<ResourceResult<Vec<_>>>()?;

    resource.set_attributes(cohort, attributes)
}

/// Parse one incoming attribute. A client `uuid` is only accepted when it
/// names an active attribute of the same type on this cohort, which the
/// incoming value then overwrites. New attributes get a server-assigned uuid.
fn parse_attribute(cohort: &Cohort, value: Value) -> ResourceResult<CohortAttribute> {
    let Value::Object(mut object) = value else {
        return Err(invalid("attributes", "an array of objects"));
    };

    let type_uuid = object
        .remove("attributeType")
        .map(|v| reference_key("attributeType", v))
        .transpose()?
        .flatten()
        .ok_or_else(|| {
            ResourceError::Validation("Every attribute needs an attributeType".to_string())
        })?;
    let type_uuid = Uuid::parse_str(&type_uuid).map_err(|_| {
        ResourceError::ObjectNotFound("No Cohort Attribute Type found for that uuid".to_string())
    })?;

    let value = match object.remove("value") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
        Some(_) => return Err(invalid("value", "a string")),
    };

    if let Some(uuid) = object.remove("uuid").filter(|v| !v.is_null()) {
        let known = uuid
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .is_some_and(|uuid| {
                cohort
                    .active_attributes()
                    .any(|a| a.uuid == uuid && a.attribute_type.uuid == type_uuid)
            });
        if !known {
            return Err(ResourceError::Validation(format!(
                "Attribute uuid {} does not belong to this cohort",
                uuid
            )));
        }
    }

    // Only the uuid is known here; the full type is resolved when the
    // attribute is applied to the cohort.
    Ok(CohortAttribute::new(
        CohortAttributeType {
            uuid: type_uuid,
            name: String::new(),
            description: None,
        },
        value,
    ))
}

fn set_members(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    let Value::Array(items) = value else {
        return Err(invalid("cohortMembers", "an array"));
    };

    let mut members = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(mut object) = item else {
            return Err(invalid("cohortMembers", "an array of objects"));
        };

        let existing = object
            .get("uuid")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .and_then(|uuid| cohort.cohort_members.iter().find(|m| m.uuid == uuid))
            .cloned();

        let mut member = match existing {
            Some(member) => member,
            None => {
                let patient = object
                    .get("patient")
                    .cloned()
                    .map(|v| reference_key("patient", v))
                    .transpose()?
                    .flatten()
                    .ok_or_else(|| {
                        ResourceError::Validation("Every cohort member needs a patient".to_string())
                    })?;
                let patient = Uuid::parse_str(&patient)
                    .map_err(|_| invalid("patient", "a patient uuid"))?;
                CohortMember::new(patient)
            }
        };

        if let Some(value) = object.remove("startDate") {
            member.start_date = optional_date("startDate", value)?;
        }
        if let Some(value) = object.remove("endDate") {
            member.end_date = optional_date("endDate", value)?;
        }
        if let Some(value) = object.remove("voided") {
            member.voided = expect_bool("voided", value)?;
        }
        if let Some(value) = object.remove("voidReason") {
            member.void_reason = optional_string("voidReason", value)?;
        }

        members.push(member);
    }

    cohort.cohort_members = members;
    Ok(())
}

fn set_group_cohort(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.group_cohort = expect_bool("groupCohort", value)?;
    Ok(())
}

fn set_voided(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.voided = expect_bool("voided", value)?;
    Ok(())
}

fn set_void_reason(_: &CohortResource, cohort: &mut Cohort, value: Value) -> ResourceResult<()> {
    cohort.void_reason = optional_string("voidReason", value)?;
    Ok(())
}

// ============================================================
// Value conversion
// ============================================================

fn invalid(property: &str, expected: &str) -> ResourceError {
    ResourceError::Validation(format!("Property '{}' must be {}", property, expected))
}

fn expect_string(property: &str, value: Value) -> ResourceResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(invalid(property, "a string")),
    }
}

fn optional_string(property: &str, value: Value) -> ResourceResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(invalid(property, "a string")),
    }
}

fn expect_bool(property: &str, value: Value) -> ResourceResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(invalid(property, "a boolean")),
    }
}

fn optional_date(property: &str, value: Value) -> ResourceResult<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => parse_date(&s)
            .map(Some)
            .ok_or_else(|| invalid(property, "a date (YYYY-MM-DD or RFC 3339)")),
        _ => Err(invalid(property, "a date string")),
    }
}

/// Accepts RFC 3339, `2024-01-31T00:00:00.000+0000` and plain `2024-01-31`.
pub(crate) fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A reference is either a bare string or an object carrying `uuid`.
fn reference_key(property: &str, value: Value) -> ResourceResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Object(object) => match object.get("uuid") {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            _ => Err(invalid(property, "a uuid or an object with a uuid")),
        },
        _ => Err(invalid(property, "a uuid or an object with a uuid")),
    }
}
