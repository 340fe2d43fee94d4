//! Admin HTTP surface + the `Query`/`GetMetrics` control RPCs (§6), built
//! with axum. Grounded on `mapleaiorg-maple`'s `palm-daemon` router/state/
//! error split — the only axum precedent in the retrieval pack.

mod auth;
mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the full router: a public health route, plus the routing-config
/// and module-registry surfaces gated by the permission each route needs.
pub fn build_router(state: AppState) -> Router {
    let routing_config_routes = Router::new()
        .route("/", get(handlers::get_routing_config))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_read_config))
        .merge(
            Router::new()
                .route("/", put(handlers::put_routing_config))
                .route("/category/:name", patch(handlers::upsert_category))
                .route("/category/:name", delete(handlers::delete_category))
                .route("/reload", post(handlers::reload_routing_config))
                .layer(middleware::from_fn_with_state(state.clone(), auth::require_write_config)),
        );

    let module_routes = Router::new()
        .route("/", get(handlers::list_modules))
        .route("/build", post(handlers::build_module))
        .route("/:category/:platform", get(handlers::get_module))
        .route("/:category/:platform", delete(handlers::delete_module))
        .route("/:category/:platform/:action", post(handlers::module_action))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_manage_modules));

    let admin_routes = Router::new()
        .route("/health", get(handlers::health))
        .nest("/routing-config", routing_config_routes)
        .nest("/modules", module_routes);

    Router::new()
        .nest("/admin", admin_routes)
        .route("/query", post(handlers::query))
        .route("/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
