use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;
use casare_core::AppError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

/// Builds the full HTTP (and websocket upgrade) router. Every route is
/// bearer-authenticated except `/health`, which is the unauthenticated
/// liveness probe the orchestrator's own deployment tooling polls.
pub fn build_router(app_state: AppState, cors_allowed_origin: Option<&str>) -> Result<Router, AppError> {
    let protected_routes = Router::new()
        .route(
            "/workflows",
            post(handlers::workflows::create_workflow_handler),
        )
        .route(
            "/workflows/{workflow_id}",
            get(handlers::workflows::get_workflow_handler),
        )
        .route(
            "/workflows/{workflow_id}/versions",
            get(handlers::workflows::list_versions_handler)
                .post(handlers::workflows::create_version_handler),
        )
        .route(
            "/workflows/{workflow_id}/versions/{version_id}/activate",
            post(handlers::workflows::activate_version_handler),
        )
        .route(
            "/workflows/{workflow_id}/pin",
            put(handlers::workflows::pin_version_handler).delete(handlers::workflows::remove_pin_handler),
        )
        .route(
            "/jobs",
            get(handlers::jobs::list_jobs_handler).post(handlers::jobs::submit_job_handler),
        )
        .route("/jobs/{job_id}", get(handlers::jobs::get_job_handler))
        .route(
            "/jobs/{job_id}/cancel",
            post(handlers::jobs::cancel_job_handler),
        )
        .route(
            "/robots",
            get(handlers::robots::list_robots_handler).post(handlers::robots::register_robot_handler),
        )
        .route("/robots/{robot_id}", get(handlers::robots::get_robot_handler).delete(handlers::robots::deregister_robot_handler))
        .route(
            "/robots/{robot_id}/heartbeat",
            post(handlers::robots::heartbeat_handler),
        )
        .route(
            "/schedules",
            get(handlers::schedules::list_schedules_handler).post(handlers::schedules::create_schedule_handler),
        )
        .route(
            "/schedules/{schedule_id}",
            get(handlers::schedules::get_schedule_handler),
        )
        .route(
            "/schedules/dependencies",
            post(handlers::schedules::add_dependency_edge_handler),
        )
        .route(
            "/schedules/{schedule_id}/dependencies/{depends_on}",
            delete(handlers::schedules::remove_dependency_edge_handler),
        )
        .route(
            "/calendars",
            get(handlers::calendars::list_calendars_handler).post(handlers::calendars::create_calendar_handler),
        )
        .route(
            "/calendars/{calendar_id}/blackouts",
            get(handlers::calendars::list_blackouts_handler).post(handlers::calendars::add_blackout_handler),
        )
        .route("/audit", get(handlers::audit::read_range_handler))
        .route("/audit/verify", get(handlers::audit::verify_chain_handler))
        .route_layer(from_fn_with_state(app_state.clone(), middleware::require_api_key));

    let robot_session_routes = Router::new()
        .route("/ws/robot", get(handlers::robot_session::robot_session_handler))
        .route_layer(from_fn_with_state(app_state.clone(), middleware::require_api_key));

    let cors_layer = match cors_allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                HeaderValue::from_str(origin)
                    .map_err(|error| AppError::Internal(format!("invalid CORS_ALLOWED_ORIGIN: {error}")))?,
            )
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
        None => CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null"))),
    };

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(protected_routes)
        .merge(robot_session_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state))
}
