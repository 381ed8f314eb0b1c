//! Request authentication.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};

use crate::resource::Caller;

/// Principal assigned to every request when no API key is configured.
pub const LOCAL_PRINCIPAL: &str = "local";

/// Principal assigned to requests presenting the configured API key.
pub const API_KEY_PRINCIPAL: &str = "api-key";

/// Security configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// API key for authentication (from COHORT_REST_API_KEY)
    pub api_key: Option<String>,
    /// Allowed CORS origins (from COHORT_REST_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
}

impl SecurityConfig {
    /// Load security configuration from environment variables.
    pub fn from_env() -> Self {
        let api_key = std::env::var("COHORT_REST_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let cors_origins = std::env::var("COHORT_REST_CORS_ORIGINS")
            .ok()
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect());

        Self {
            api_key,
            cors_origins,
        }
    }

    /// Create a config with no authentication (for local development/testing).
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            cors_origins: None,
        }
    }

    /// Create a config with authentication enabled (for testing).
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            cors_origins: None,
        }
    }

    /// Create a config with specific CORS origins.
    pub fn with_cors_origins(origins: Vec<String>) -> Self {
        Self {
            api_key: None,
            cors_origins: Some(origins),
        }
    }

    pub fn cors_layer(&self) -> CorsLayer {
        match &self.cors_origins {
            Some(origins) => {
                let origins: Vec<HeaderValue> =
                    origins.iter().filter_map(|o| o.parse().ok()).collect();
                CorsLayer::new()
                    .allow_origin(origins)
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
            None => CorsLayer::permissive(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Resolve the [`Caller`] for a request and store it in the request extensions.
///
/// A request without an `Authorization` header proceeds as
/// [`Caller::Anonymous`]; handlers and the resource decide whether that is
/// enough. A header that is present but wrong is rejected here.
pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let caller = resolve_caller(&config, &request)?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

fn resolve_caller(config: &SecurityConfig, request: &Request<Body>) -> Result<Caller, StatusCode> {
    let expected_key = match &config.api_key {
        Some(key) => key,
        None => return Ok(Caller::authenticated(LOCAL_PRINCIPAL)),
    };

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) if token == expected_key => Ok(Caller::authenticated(API_KEY_PRINCIPAL)),
            Some(_) => {
                tracing::warn!("Invalid API key provided");
                Err(StatusCode::UNAUTHORIZED)
            }
            None => {
                tracing::warn!("Invalid Authorization header format");
                Err(StatusCode::UNAUTHORIZED)
            }
        },
        None => Ok(Caller::Anonymous),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_auth(value: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header("Authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn disabled_config_authenticates_everyone() {
        let caller = resolve_caller(&SecurityConfig::disabled(), &request_with_auth(None)).unwrap();
        assert_eq!(caller, Caller::authenticated(LOCAL_PRINCIPAL));
    }

    #[test]
    fn valid_bearer_token_authenticates() {
        let config = SecurityConfig::with_api_key("test-key");
        let caller = resolve_caller(&config, &request_with_auth(Some("Bearer test-key"))).unwrap();
        assert!(caller.is_authenticated());
    }

    #[test]
    fn missing_header_is_anonymous() {
        let config = SecurityConfig::with_api_key("test-key");
        let caller = resolve_caller(&config, &request_with_auth(None)).unwrap();
        assert_eq!(caller, Caller::Anonymous);
    }

    #[test]
    fn wrong_token_is_rejected() {
        let config = SecurityConfig::with_api_key("test-key");
        let result = resolve_caller(&config, &request_with_auth(Some("Bearer nope")));
        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let config = SecurityConfig::with_api_key("test-key");
        let result = resolve_caller(&config, &request_with_auth(Some("Basic dXNlcjpwYXNz")));
        assert_eq!(result, Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn security_config_disabled_has_no_auth() {
        let config = SecurityConfig::disabled();
        assert!(config.api_key.is_none());
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn security_config_with_cors_origins_keeps_auth_disabled() {
        let config = SecurityConfig::with_cors_origins(vec!["http://localhost:3000".to_string()]);
        assert!(config.api_key.is_none());
        assert_eq!(
            config.cors_origins,
            Some(vec!["http://localhost:3000".to_string()])
        );
        let _ = config.cors_layer();
    }

    #[test]
    fn security_config_with_api_key_has_auth() {
        let config = SecurityConfig::with_api_key("test-key");
        assert_eq!(config.api_key, Some("test-key".to_string()));
    }
}
