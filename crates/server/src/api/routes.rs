use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{documents, fields, handlers, jobs, middleware::metrics_middleware, projects};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Jobs
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job))
        // Project documents and index
        .route(
            "/projects/{id}/documents",
            post(documents::upload_documents).delete(documents::delete_documents),
        )
        .route("/projects/{id}/index", get(projects::get_index))
        .route("/projects/{id}/index/entries", get(projects::list_entries))
        // Fields, classes and labels
        .route(
            "/projects/{id}/fields",
            post(fields::create_field).get(fields::list_fields),
        )
        .route("/fields/{id}", get(fields::get_field))
        .route("/fields/{id}/classes", post(fields::add_class))
        .route("/fields/{id}/labels/{document_id}", put(fields::set_label))
        // Field versions and predictions
        .route("/fields/{id}/versions", get(fields::list_versions))
        .route("/fields/{id}/predictions", get(fields::list_predictions))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
