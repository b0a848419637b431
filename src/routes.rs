// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, catalog, exam, revision},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, catalog, exams, revision, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let catalog_routes = Router::new()
        .route("/modules", get(catalog::list_modules))
        .route("/modules/{id}/lessons", get(catalog::list_lessons))
        .route("/exams", get(catalog::list_exams));

    let exam_routes = Router::new()
        .route("/{id}/start", post(exam::start_exam))
        .route("/{id}/submit", post(exam::submit_exam))
        .route("/attempts/{attempt_id}/results", get(exam::attempt_results))
        .route("/history", get(exam::exam_history))
        .route("/stats", get(exam::dashboard_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let revision_routes = Router::new()
        .route("/create", post(revision::create_revision_quiz))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/modules", post(admin::create_module))
        .route("/modules/{id}/lessons", post(admin::create_lesson))
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/exams", post(admin::create_exam))
        .route("/exams/{id}", delete(admin::delete_exam))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/catalog", catalog_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/revision", revision_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
