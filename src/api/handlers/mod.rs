use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::{json, Value};

use super::AppState;
use crate::models::*;
use crate::resource::{
    properties, search, Caller, Page, Paging, RequestContext, ResourceDescription,
    ResourceError, View, COHORT_NAMESPACE, REST_BASE,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Reason recorded when a cohort is deleted without one.
const DEFAULT_VOID_REASON: &str = "Voided via web service";

// ============================================================
// Error Handling
// ============================================================

/// Map a resource error to a status code. Client errors are returned as-is;
/// internal errors are logged in full and returned as a generic message.
fn resource_error(e: ResourceError) -> (StatusCode, String) {
    let status = match &e {
        ResourceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ResourceError::InvalidParameter(_) | ResourceError::Validation(_) => StatusCode::BAD_REQUEST,
        ResourceError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
        ResourceError::OperationNotSupported(_) => StatusCode::METHOD_NOT_ALLOWED,
        ResourceError::Service(inner) => return internal_error(inner),
    };

    tracing::warn!("Request rejected ({}): {}", status, e);
    (status, e.to_string())
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Reject anonymous callers before any side effect happens.
fn ensure_authenticated(caller: &Caller) -> ApiResult<()> {
    if caller.is_authenticated() {
        Ok(())
    } else {
        Err(resource_error(ResourceError::Unauthorized))
    }
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Cohort not found".to_string())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ============================================================
// Cohorts
// ============================================================

/// Resolve the description for the requested view, failing for anonymous
/// callers and for views the resource does not describe.
fn describe(state: &AppState, caller: &Caller, view: &View) -> ApiResult<ResourceDescription> {
    state
        .resource
        .representation_description(caller, view)
        .map_err(resource_error)?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unsupported representation: {}", view.as_str()),
            )
        })
}

fn view_param(params: &HashMap<String, String>) -> View {
    View::from_param(params.get("v").map(String::as_str))
}

fn request_body(body: Value) -> ApiResult<serde_json::Map<String, Value>> {
    match body {
        Value::Object(object) => Ok(object),
        _ => Err((
            StatusCode::BAD_REQUEST,
            "Request body must be a JSON object".to_string(),
        )),
    }
}

pub async fn list_cohorts(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let description = describe(&state, &caller, &view_param(&params))?;
    let paging = Paging::from_params(&params, &state.paging);
    let context = RequestContext::new(caller, params.clone(), paging);

    let results = if search::is_search(&context) {
        state.resource.search(&context)
    } else {
        state.resource.get_all(&context)
    }
    .map_err(resource_error)?;
    tracing::debug!("Cohort list matched {} cohorts", results.total());

    let page = results.into_page().map(|c| description.render(&c));
    Ok(Json(page_json(page, &params)))
}

pub async fn get_cohort(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(uuid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let description = describe(&state, &caller, &view_param(&params))?;

    state
        .resource
        .get_by_unique_id(&uuid)
        .map_err(resource_error)?
        .map(|c| Json(description.render(&c)))
        .ok_or_else(not_found)
}

pub async fn create_cohort(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_authenticated(&caller)?;
    let description = describe(&state, &caller, &view_param(&params))?;
    let body = request_body(body)?;

    let resource = &state.resource;
    resource
        .creatable_properties()
        .validate(&body, true)
        .map_err(resource_error)?;

    let mut cohort = resource.new_delegate();
    properties::bind(resource, &mut cohort, body).map_err(resource_error)?;
    let saved = resource.save(cohort).map_err(resource_error)?;

    tracing::info!("Created cohort {} ({})", saved.uuid, saved.name);
    Ok((StatusCode::CREATED, Json(description.render(&saved))))
}

pub async fn update_cohort(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(uuid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    ensure_authenticated(&caller)?;
    let description = describe(&state, &caller, &view_param(&params))?;
    let body = request_body(body)?;

    let resource = &state.resource;
    resource
        .updatable_properties()
        .and_then(|rules| rules.validate(&body, false))
        .map_err(resource_error)?;

    let mut cohort = resource
        .get_by_unique_id(&uuid)
        .map_err(resource_error)?
        .ok_or_else(not_found)?;
    properties::bind(resource, &mut cohort, body).map_err(resource_error)?;
    let saved = resource.save(cohort).map_err(resource_error)?;

    Ok(Json(description.render(&saved)))
}

pub async fn delete_cohort(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(uuid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<StatusCode> {
    ensure_authenticated(&caller)?;

    let resource = &state.resource;
    let cohort = resource
        .get_by_unique_id(&uuid)
        .map_err(resource_error)?
        .ok_or_else(not_found)?;

    let purge = params
        .get("purge")
        .is_some_and(|p| p.eq_ignore_ascii_case("true"));

    if purge {
        resource.purge(&cohort).map_err(resource_error)?;
    } else if !cohort.voided {
        let reason = params
            .get("reason")
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_VOID_REASON);
        resource.delete(cohort, reason).map_err(resource_error)?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Wrap a rendered page as `{"results": [...], "links": [...]}` with `next`
/// and `prev` links that repeat the original query.
fn page_json(page: Page<Value>, params: &HashMap<String, String>) -> Value {
    let mut links = Vec::new();
    if page.has_more {
        links.push(json!({
            "rel": "next",
            "uri": page_uri(params, page.next_start_index()),
        }));
    }
    if page.has_previous() {
        links.push(json!({
            "rel": "prev",
            "uri": page_uri(params, page.previous_start_index()),
        }));
    }

    let mut body = json!({ "results": page.results });
    if !links.is_empty() {
        body["links"] = Value::Array(links);
    }
    body
}

fn page_uri(params: &HashMap<String, String>, start_index: usize) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "startIndex")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut query: Vec<String> = pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    query.push(format!("startIndex={}", start_index));

    format!("{}/{}/cohort?{}", REST_BASE, COHORT_NAMESPACE, query.join("&"))
}

// ============================================================
// Reference data
// ============================================================

pub async fn list_cohort_types(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<CohortType>>> {
    ensure_authenticated(&caller)?;
    state.db.get_all_cohort_types().map(Json).map_err(internal_error)
}

pub async fn create_cohort_type(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<CreateCohortTypeInput>,
) -> ApiResult<(StatusCode, Json<CohortType>)> {
    ensure_authenticated(&caller)?;
    state
        .db
        .create_cohort_type(input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn list_cohort_attribute_types(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<CohortAttributeType>>> {
    ensure_authenticated(&caller)?;
    state
        .db
        .get_all_cohort_attribute_types()
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_cohort_attribute_type(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<CreateCohortAttributeTypeInput>,
) -> ApiResult<(StatusCode, Json<CohortAttributeType>)> {
    ensure_authenticated(&caller)?;
    state
        .db
        .create_cohort_attribute_type(input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn list_locations(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Location>>> {
    ensure_authenticated(&caller)?;
    state.db.get_all_locations().map(Json).map_err(internal_error)
}

pub async fn create_location(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<CreateLocationInput>,
) -> ApiResult<(StatusCode, Json<Location>)> {
    ensure_authenticated(&caller)?;
    state
        .db
        .create_location(input)
        .map(|l| (StatusCode::CREATED, Json(l)))
        .map_err(internal_error)
}
