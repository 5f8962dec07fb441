use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router, middleware};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api;
use crate::error::mask_internal_errors;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(state.config.gateway.frontend_url.as_deref());
    let production = state.config.environment.is_production();

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .nest("/api/users", users())
        .nest("/api/companions", companions())
        .nest("/api/chat", chat())
        .nest("/api/voice", voice())
        .nest("/api/memory", memory())
        .nest("/api/subscriptions", subscriptions())
        .nest("/api/teams", teams())
        .nest("/api/workspaces", workspaces())
        .nest("/api/tools", tools())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let router = if production {
        router.layer(middleware::map_response(mask_internal_errors))
    } else {
        router
    };

    router.with_state(state)
}

fn users() -> Router<SharedState> {
    Router::new()
        .route("/register", post(api::users::register))
        .route("/login", post(api::users::login))
        .route("/refresh", post(api::users::refresh))
        .route(
            "/me",
            get(api::users::me)
                .patch(api::users::update_me)
                .delete(api::users::delete_me),
        )
}

fn companions() -> Router<SharedState> {
    Router::new()
        .route("/", get(api::companions::list).post(api::companions::create))
        .route(
            "/{id}",
            get(api::companions::get)
                .patch(api::companions::update)
                .delete(api::companions::delete),
        )
}

fn chat() -> Router<SharedState> {
    Router::new()
        .route(
            "/{companion_id}",
            get(api::chat::history).delete(api::chat::clear),
        )
        .route("/{companion_id}/messages", post(api::chat::send_message))
}

fn voice() -> Router<SharedState> {
    Router::new()
        .route("/usage", get(api::voice::usage))
        .route("/{companion_id}", post(api::voice::synthesize))
}

fn memory() -> Router<SharedState> {
    Router::new()
        .route(
            "/{companion_id}",
            get(api::memory::list).post(api::memory::create),
        )
        .route("/{companion_id}/{memory_id}", delete(api::memory::delete))
}

fn subscriptions() -> Router<SharedState> {
    Router::new()
        .route("/", get(api::subscriptions::current))
        .route("/plans", get(api::subscriptions::plans))
        .route("/checkout", post(api::subscriptions::checkout))
        .route("/cancel", post(api::subscriptions::cancel))
        .route("/webhook", post(api::subscriptions::webhook))
}

fn teams() -> Router<SharedState> {
    Router::new()
        .route("/", get(api::teams::list).post(api::teams::create))
        .route(
            "/{id}",
            get(api::teams::get)
                .patch(api::teams::update)
                .delete(api::teams::delete),
        )
        .route(
            "/{id}/members",
            get(api::teams::list_members).post(api::teams::add_member),
        )
        .route(
            "/{id}/members/{user_id}",
            patch(api::teams::update_member).delete(api::teams::remove_member),
        )
}

fn workspaces() -> Router<SharedState> {
    Router::new()
        .route("/", get(api::workspaces::list).post(api::workspaces::create))
        .route(
            "/{id}",
            get(api::workspaces::get)
                .patch(api::workspaces::update)
                .delete(api::workspaces::delete),
        )
        .route("/{id}/companions", get(api::workspaces::companions))
}

fn tools() -> Router<SharedState> {
    Router::new()
        .route("/", get(api::tools::list).post(api::tools::create))
        .route(
            "/{id}",
            get(api::tools::get)
                .patch(api::tools::update)
                .delete(api::tools::delete),
        )
}

/// Only the configured frontend may make credentialed cross-origin calls.
/// Without one, cross-origin requests are not allowed at all.
fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let Some(origin) = frontend_url.map(|u| u.trim_end_matches('/')) else {
        return base;
    };
    match HeaderValue::from_str(origin) {
        Ok(value) => base
            .allow_origin(AllowOrigin::exact(value))
            .allow_credentials(true),
        Err(e) => {
            warn!("ignoring invalid frontend_url {origin:?} for CORS: {e}");
            base
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let schema_version = state.db.schema_version().ok();
    Json(serde_json::json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "brain": state.brain.provider_id(),
        "billing": state.stripe.is_some(),
        "schema_version": schema_version,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
