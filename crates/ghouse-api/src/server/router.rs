//! Application router configuration.

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;

use super::state::ServerState;
use crate::auth::jwt_auth_middleware;
use crate::ws;

/// Create the application router with the given state.
pub fn create_router(state: ServerState) -> Router {
    use crate::handlers::{
        air, auth_users, basic, conveyor, drones, greenhouse, notifications, soil, system,
        telegram,
    };

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/", get(basic::root_handler))
        .route("/api/v1/health", get(basic::health_handler))
        .route("/api/v1/health/live", get(basic::liveness_handler))
        .route("/api/v1/health/ready", get(basic::readiness_handler))
        // User authentication (login and register)
        .route("/api/v1/auth/login", post(auth_users::login_handler))
        .route("/api/v1/auth/register", post(auth_users::register_handler))
        // Telegram bot updates
        .route(
            "/api/v1/telegram/webhook",
            post(telegram::webhook_handler),
        );

    // WebSocket route - authentication handled in the handshake
    let websocket_routes = Router::new().route("/ws", get(ws::ws_handler));

    // JWT protected routes
    let protected_routes = Router::new()
        // Session and account management
        .route("/api/v1/auth/me", get(auth_users::get_current_user_handler))
        .route("/api/v1/auth/logout", post(auth_users::logout_handler))
        .route(
            "/api/v1/auth/password",
            put(auth_users::change_password_handler),
        )
        // User administration
        .route("/api/v1/users", get(auth_users::list_users_handler))
        .route("/api/v1/users", post(auth_users::create_user_handler))
        .route(
            "/api/v1/users/:username",
            delete(auth_users::delete_user_handler),
        )
        // Greenhouse
        .route("/api/v1/greenhouse/status", get(greenhouse::status_handler))
        .route(
            "/api/v1/greenhouse/:system",
            post(greenhouse::control_handler),
        )
        .route(
            "/api/v1/greenhouse/:system/settings",
            put(greenhouse::update_settings_handler),
        )
        .route(
            "/api/v1/greenhouse/:system/history",
            get(greenhouse::history_handler),
        )
        // Air quality
        .route("/api/v1/air/current", get(air::current_handler))
        .route("/api/v1/air/history", get(air::history_handler))
        .route("/api/v1/air/analytics", get(air::analytics_handler))
        .route("/api/v1/air/thresholds", get(air::thresholds_handler))
        .route(
            "/api/v1/air/thresholds",
            put(air::update_threshold_handler),
        )
        // Drones
        .route("/api/v1/drones", get(drones::list_handler))
        .route("/api/v1/drones", post(drones::create_handler))
        .route("/api/v1/drones/stations", get(drones::stations_handler))
        .route(
            "/api/v1/drones/stations/:station_id",
            get(drones::station_status_handler),
        )
        .route("/api/v1/drones/:drone_id", get(drones::get_handler))
        .route(
            "/api/v1/drones/:drone_id/telemetry",
            get(drones::telemetry_handler),
        )
        .route(
            "/api/v1/drones/:drone_id/command",
            post(drones::command_handler),
        )
        .route(
            "/api/v1/drones/:drone_id/module",
            post(drones::change_module_handler),
        )
        .route(
            "/api/v1/drones/:drone_id/mission",
            post(drones::create_mission_handler),
        )
        .route(
            "/api/v1/drones/:drone_id/history",
            get(drones::mission_history_handler),
        )
        // Conveyor
        .route("/api/v1/conveyor/status", get(conveyor::status_handler))
        .route("/api/v1/conveyor/start", post(conveyor::start_handler))
        .route("/api/v1/conveyor/stop", post(conveyor::stop_handler))
        .route("/api/v1/conveyor/reset", post(conveyor::reset_handler))
        .route("/api/v1/conveyor/speed", put(conveyor::speed_handler))
        .route("/api/v1/conveyor/interval", put(conveyor::interval_handler))
        .route(
            "/api/v1/conveyor/statistics",
            get(conveyor::statistics_handler),
        )
        .route(
            "/api/v1/conveyor/maintenance",
            get(conveyor::maintenance_handler),
        )
        .route(
            "/api/v1/conveyor/maintenance/log",
            post(conveyor::log_maintenance_handler),
        )
        // Soil
        .route("/api/v1/soil/current", get(soil::current_handler))
        .route("/api/v1/soil/zones", get(soil::zones_handler))
        .route("/api/v1/soil/zones", put(soil::put_zone_handler))
        .route(
            "/api/v1/soil/:zone_id/analyze",
            post(soil::analyze_handler),
        )
        .route(
            "/api/v1/soil/:zone_id/history",
            get(soil::history_handler),
        )
        .route(
            "/api/v1/soil/:zone_id/recommendations",
            get(soil::recommendations_handler),
        )
        // Notifications
        .route("/api/v1/notifications", get(notifications::list_handler))
        .route(
            "/api/v1/notifications/unread",
            get(notifications::unread_handler),
        )
        .route(
            "/api/v1/notifications/read",
            post(notifications::mark_read_handler),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(notifications::mark_all_read_handler),
        )
        .route(
            "/api/v1/notifications/settings",
            get(notifications::settings_handler),
        )
        .route(
            "/api/v1/notifications/settings",
            put(notifications::update_settings_handler),
        )
        .route(
            "/api/v1/notifications/send",
            post(notifications::send_handler),
        )
        .route(
            "/api/v1/notifications/:id",
            delete(notifications::delete_handler),
        )
        // Telegram administration
        .route("/api/v1/telegram/status", get(telegram::status_handler))
        .route("/api/v1/telegram/send", post(telegram::send_handler))
        .route(
            "/api/v1/telegram/broadcast",
            post(telegram::broadcast_handler),
        )
        .route(
            "/api/v1/telegram/subscribers",
            get(telegram::subscribers_handler),
        )
        // System
        .route("/api/v1/system/stats", get(system::stats_handler))
        .route("/api/v1/system/config", get(system::config_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(websocket_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
