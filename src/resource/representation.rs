//! View-dependent projections of a cohort.
//!
//! A [`ResourceDescription`] is an immutable list of the properties and links
//! a view exposes. The descriptions are built by pure functions, one per
//! [`View`], and rendered to JSON through the property registry.

use serde_json::{json, Map, Value};

use super::properties;
use super::{cohort_uri, resource_uri};
use crate::models::*;

/// The representation a client asked for with the `v` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Default,
    Full,
    /// Any view this resource does not describe, e.g. `ref` or `custom:(...)`.
    Unsupported(String),
}

impl View {
    /// Parse the `v` query parameter. Absent means `default`.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Default,
            Some(v) if v.eq_ignore_ascii_case("default") => Self::Default,
            Some(v) if v.eq_ignore_ascii_case("full") => Self::Full,
            Some(v) => Self::Unsupported(v.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Full => "full",
            Self::Unsupported(v) => v,
        }
    }
}

/// How deeply a nested object is rendered.
///
/// - `Ref`: uuid, display and a self link only
/// - `Default`: the object's own fields
/// - `Full`: the object's own fields, with nested collections expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Ref,
    Default,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescription {
    pub name: &'static str,
    pub depth: Depth,
}

/// A named link rendered relative to the cohort's own uri.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescription {
    pub rel: &'static str,
    /// Appended to the self uri; a leading `.` stands for the uri itself.
    pub suffix: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceDescription {
    properties: Vec<PropertyDescription>,
    links: Vec<LinkDescription>,
    self_link: bool,
}

impl ResourceDescription {
    fn with_property(mut self, name: &'static str) -> Self {
        self.properties.push(PropertyDescription {
            name,
            depth: Depth::Default,
        });
        self
    }

    fn with_property_at(mut self, name: &'static str, depth: Depth) -> Self {
        self.properties.push(PropertyDescription { name, depth });
        self
    }

    fn with_self_link(mut self) -> Self {
        self.self_link = true;
        self
    }

    fn with_link(mut self, rel: &'static str, suffix: &'static str) -> Self {
        self.links.push(LinkDescription { rel, suffix });
        self
    }

    pub fn properties(&self) -> &[PropertyDescription] {
        &self.properties
    }

    pub fn property_names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|p| p.name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }

    pub fn depth_of(&self, name: &str) -> Option<Depth> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.depth)
    }

    pub fn links(&self) -> &[LinkDescription] {
        &self.links
    }

    pub fn has_self_link(&self) -> bool {
        self.self_link
    }

    /// Render a cohort as a JSON object containing exactly the described
    /// properties, followed by a `links` array when any links are described.
    pub fn render(&self, cohort: &Cohort) -> Value {
        let mut object = Map::new();

        for property in &self.properties {
            if let Some(accessor) = properties::accessor(property.name) {
                object.insert(property.name.to_string(), (accessor.get)(cohort, property.depth));
            }
        }

        let self_uri = cohort_uri(&cohort.uuid.to_string());
        let mut links = Vec::new();
        if self.self_link {
            links.push(link("self", self_uri.clone()));
        }
        for l in &self.links {
            let uri = format!("{}{}", self_uri, l.suffix.trim_start_matches('.'));
            links.push(link(l.rel, uri));
        }
        if !links.is_empty() {
            object.insert("links".to_string(), Value::Array(links));
        }

        Value::Object(object)
    }
}

/// Properties every view starts from.
fn shared_description() -> ResourceDescription {
    ResourceDescription::default()
        .with_property("name")
        .with_property("description")
        .with_property("startDate")
        .with_property("endDate")
        .with_property("attributes")
        .with_property("groupCohort")
}

pub fn default_description() -> ResourceDescription {
    shared_description()
        .with_property("uuid")
        .with_property_at("location", Depth::Ref)
        .with_property_at("cohortType", Depth::Ref)
        .with_property("voided")
        .with_property("voidReason")
        .with_property("display")
        .with_self_link()
        .with_link("full", ".?v=full")
}

pub fn full_description() -> ResourceDescription {
    shared_description()
        .with_property_at("location", Depth::Full)
        .with_property_at("cohortMembers", Depth::Full)
        .with_property_at("cohortType", Depth::Full)
        .with_property("voided")
        .with_property("voidReason")
        .with_property("uuid")
        .with_property("auditInfo")
        .with_property("display")
        .with_self_link()
}

// ============================================================
// Nested objects
// ============================================================

fn link(rel: &str, uri: String) -> Value {
    json!({ "rel": rel, "uri": uri })
}

fn reference(uuid: String, display: &str, uri: String) -> Value {
    json!({
        "uuid": uuid,
        "display": display,
        "links": [link("self", uri)],
    })
}

pub(crate) fn location_json(location: &Location, depth: Depth) -> Value {
    let uuid = location.uuid.to_string();
    let uri = resource_uri("location", &uuid);
    match depth {
        Depth::Ref => reference(uuid, &location.name, uri),
        Depth::Default | Depth::Full => json!({
            "uuid": uuid,
            "display": location.name,
            "name": location.name,
            "description": location.description,
            "retired": location.retired,
            "links": [link("self", uri)],
        }),
    }
}

pub(crate) fn cohort_type_json(cohort_type: &CohortType, depth: Depth) -> Value {
    let uuid = cohort_type.uuid.to_string();
    let uri = resource_uri("cohortm/cohorttype", &uuid);
    match depth {
        Depth::Ref => reference(uuid, &cohort_type.name, uri),
        Depth::Default | Depth::Full => json!({
            "uuid": uuid,
            "display": cohort_type.name,
            "name": cohort_type.name,
            "description": cohort_type.description,
            "links": [link("self", uri)],
        }),
    }
}

pub(crate) fn attribute_type_json(attribute_type: &CohortAttributeType, depth: Depth) -> Value {
    let uuid = attribute_type.uuid.to_string();
    let uri = resource_uri("cohortm/cohortattributetype", &uuid);
    match depth {
        Depth::Ref => reference(uuid, &attribute_type.name, uri),
        Depth::Default | Depth::Full => json!({
            "uuid": uuid,
            "display": attribute_type.name,
            "name": attribute_type.name,
            "description": attribute_type.description,
            "links": [link("self", uri)],
        }),
    }
}

pub(crate) fn attribute_json(attribute: &CohortAttribute, depth: Depth) -> Value {
    let uuid = attribute.uuid.to_string();
    let display = format!(
        "{}: {}",
        attribute.attribute_type.name,
        attribute.value.as_deref().unwrap_or("")
    );
    match depth {
        Depth::Ref => json!({ "uuid": uuid, "display": display }),
        Depth::Default | Depth::Full => json!({
            "uuid": uuid,
            "display": display,
            "attributeType": attribute_type_json(&attribute.attribute_type, Depth::Ref),
            "value": attribute.value,
            "voided": attribute.voided,
        }),
    }
}

pub(crate) fn member_json(member: &CohortMember, depth: Depth) -> Value {
    let uuid = member.uuid.to_string();
    let patient = member.patient_uuid.to_string();
    match depth {
        Depth::Ref => json!({ "uuid": uuid, "display": patient }),
        Depth::Default | Depth::Full => json!({
            "uuid": uuid,
            "display": patient,
            "patient": reference(patient.clone(), &patient, resource_uri("patient", &patient)),
            "startDate": member.start_date,
            "endDate": member.end_date,
            "voided": member.voided,
            "voidReason": member.void_reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_parses_known_names_case_insensitively() {
        assert_eq!(View::from_param(None), View::Default);
        assert_eq!(View::from_param(Some("")), View::Default);
        assert_eq!(View::from_param(Some("DEFAULT")), View::Default);
        assert_eq!(View::from_param(Some("full")), View::Full);
        assert_eq!(
            View::from_param(Some("ref")),
            View::Unsupported("ref".to_string())
        );
    }

    #[test]
    fn default_description_lists_fixed_properties() {
        let description = default_description();
        assert_eq!(
            description.property_names(),
            vec![
                "name",
                "description",
                "startDate",
                "endDate",
                "attributes",
                "groupCohort",
                "uuid",
                "location",
                "cohortType",
                "voided",
                "voidReason",
                "display",
            ]
        );
        assert_eq!(description.depth_of("location"), Some(Depth::Ref));
        assert_eq!(description.depth_of("cohortType"), Some(Depth::Ref));
        assert!(!description.contains("cohortMembers"));
        assert!(!description.contains("auditInfo"));
        assert!(description.has_self_link());
        assert_eq!(
            description.links(),
            &[LinkDescription {
                rel: "full",
                suffix: ".?v=full"
            }]
        );
    }

    #[test]
    fn full_description_expands_references() {
        let description = full_description();
        assert_eq!(description.depth_of("location"), Some(Depth::Full));
        assert_eq!(description.depth_of("cohortMembers"), Some(Depth::Full));
        assert_eq!(description.depth_of("cohortType"), Some(Depth::Full));
        assert!(description.contains("auditInfo"));
        assert!(description.has_self_link());
        assert!(description.links().is_empty());
    }

    #[test]
    fn render_emits_only_described_properties() {
        let mut cohort = Cohort::new();
        cohort.name = "Youth Club".to_string();

        let rendered = default_description().render(&cohort);
        let object = rendered.as_object().unwrap();

        assert_eq!(object["display"], "Youth Club");
        assert!(object.get("cohortMembers").is_none());
        assert!(object.get("auditInfo").is_none());

        let links = object["links"].as_array().unwrap();
        let self_uri = format!("/ws/rest/v1/cohortm/cohort/{}", cohort.uuid);
        assert_eq!(links[0]["rel"], "self");
        assert_eq!(links[0]["uri"], self_uri.as_str());
        assert_eq!(links[1]["rel"], "full");
        assert_eq!(links[1]["uri"], format!("{}?v=full", self_uri).as_str());
    }

    #[test]
    fn reference_depth_renders_minimal_location() {
        let location = Location {
            id: 7,
            uuid: uuid::Uuid::new_v4(),
            name: "Kisumu".to_string(),
            description: Some("Clinic".to_string()),
            retired: false,
        };

        let reference = location_json(&location, Depth::Ref);
        assert_eq!(reference["display"], "Kisumu");
        assert!(reference.get("description").is_none());

        let full = location_json(&location, Depth::Full);
        assert_eq!(full["description"], "Clinic");
    }
}
