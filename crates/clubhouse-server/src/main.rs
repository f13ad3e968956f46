mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use clubhouse_api::codes::CodeSigner;
use clubhouse_api::middleware::require_auth;
use clubhouse_api::notify::Notifier;
use clubhouse_api::payments::HttpRefundGateway;
use clubhouse_api::{AppState, AppStateInner, auth, events, guests, payments, registrations, roster};
use clubhouse_db::Database;
use clubhouse_gateway::Dispatcher;
use clubhouse_gateway::connection;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubhouse=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;
    if let Some(username) = &config.bootstrap_admin {
        if db.set_admin_by_username(username, true)? {
            info!("Granted admin role to {}", username);
        } else {
            warn!("CLUB_BOOTSTRAP_ADMIN user '{}' does not exist yet", username);
        }
    }

    if config.notify_url.is_none() {
        info!("CLUB_NOTIFY_URL not set, confirmations are only logged");
    }
    info!("Refund endpoints configured for {} provider(s)", config.refund_urls.len());

    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner::new(
        db,
        config.jwt_secret.clone(),
        dispatcher,
        Notifier::new(config.notify_url.clone()),
        Arc::new(HttpRefundGateway::new(config.refund_urls.clone())),
        CodeSigner::new(&config.code_secret)?,
    ));

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .route("/gateway", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/events", get(events::list).post(events::create))
        .route("/events/{event_id}", get(events::detail).put(events::update))
        .route(
            "/events/{event_id}/registration",
            post(registrations::register_handler).delete(registrations::cancel_handler),
        )
        .route(
            "/events/{event_id}/guest",
            put(guests::set_handler).delete(guests::remove_handler),
        )
        .route(
            "/events/{event_id}/attendance-code",
            get(registrations::attendance_code_handler),
        )
        .route("/me/match-code", get(registrations::match_code_handler))
        .route("/events/{event_id}/roster", get(roster::roster_handler))
        .route(
            "/events/{event_id}/roster/{user_id}",
            post(roster::add_handler).delete(roster::remove_handler),
        )
        .route(
            "/events/{event_id}/roster/{user_id}/attendance",
            put(roster::attendance_handler),
        )
        .route(
            "/events/{event_id}/roster/{user_id}/promote",
            post(roster::promote_handler),
        )
        .route("/events/{event_id}/check-in", post(roster::check_in_handler))
        .route("/events/{event_id}/payments", post(payments::record_handler))
        .route(
            "/registrations/{registration_id}/refund",
            post(payments::decide_handler),
        )
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state);

    info!("Clubhouse server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.jwt_secret.clone())
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
