mod handlers;
mod middleware;

pub use middleware::{SecurityConfig, API_KEY_PRINCIPAL, LOCAL_PRINCIPAL};

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::PagingConfig;
use crate::db::Database;
use crate::resource::CohortResource;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub resource: CohortResource,
    pub paging: PagingConfig,
}

impl AppState {
    pub fn new(db: Database, paging: PagingConfig) -> Self {
        let shared = Arc::new(db.clone());
        let resource = CohortResource::new(shared.clone(), shared);
        Self {
            db,
            resource,
            paging,
        }
    }
}

pub fn create_router(db: Database) -> Router {
    create_router_with_config(db, SecurityConfig::default(), PagingConfig::default())
}

pub fn create_router_with_config(
    db: Database,
    security: SecurityConfig,
    paging: PagingConfig,
) -> Router {
    let state = AppState::new(db, paging);

    let protected = Router::new()
        // Cohorts
        .route(
            "/cohortm/cohort",
            get(handlers::list_cohorts).post(handlers::create_cohort),
        )
        .route(
            "/cohortm/cohort/{uuid}",
            get(handlers::get_cohort)
                .post(handlers::update_cohort)
                .delete(handlers::delete_cohort),
        )
        // Reference data
        .route(
            "/cohortm/cohorttype",
            get(handlers::list_cohort_types).post(handlers::create_cohort_type),
        )
        .route(
            "/cohortm/cohortattributetype",
            get(handlers::list_cohort_attribute_types).post(handlers::create_cohort_attribute_type),
        )
        .route(
            "/location",
            get(handlers::list_locations).post(handlers::create_location),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            security.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .merge(protected)
        .route("/health", get(handlers::health));

    Router::new()
        .nest(crate::resource::REST_BASE, api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security.cors_layer()),
        )
        .with_state(state)
}
