// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{assignments, attempts, auth, exams, health, questions},
    state::AppState,
    utils::jwt::auth_middleware,
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * Public auth routes and `/health` need no token.
/// * Everything else runs behind `auth_middleware`; handlers pick the role
///   they require through their extractor.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let public_auth = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/exams", get(exams::list_exams).post(exams::create_exam))
        .route(
            "/exams/{id}",
            get(exams::get_exam)
                .put(exams::update_exam)
                .delete(exams::delete_exam),
        )
        .route("/exams/{id}/publish", post(exams::publish_exam))
        .route("/exams/{id}/unpublish", post(exams::unpublish_exam))
        .route("/exams/{id}/archive", post(exams::archive_exam))
        .route("/exams/{id}/assign", post(exams::assign_students))
        .route("/exams/{id}/attempts", post(attempts::start_attempt))
        .route(
            "/exams/{id}/questions",
            get(questions::list_questions).post(questions::add_question),
        )
        .route(
            "/exams/{id}/questions/reorder",
            put(questions::reorder_questions),
        )
        .route(
            "/questions/{id}",
            put(questions::update_question).delete(questions::delete_question),
        )
        .route("/attempts/{id}", get(attempts::get_attempt))
        .route("/attempts/{id}/answers", post(attempts::save_answer))
        .route("/attempts/{id}/submit", post(attempts::submit_attempt))
        .route("/attempts/{id}/result", get(attempts::attempt_result))
        .route("/assignments", get(assignments::list_assignments))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let api = public_auth.merge(protected);

    let prefix = state.config.api_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(prefix, api)
    };

    app.route("/health", get(health::health))
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_origins)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, repository::MemoryRepository};

    fn app() -> Router {
        create_router(AppState {
            repo: Arc::new(MemoryRepository::new()),
            config: Config::for_tests("router-secret"),
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let response = app()
            .oneshot(Request::builder().uri("/api/exams").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
